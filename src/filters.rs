//! filters.rs
//!
//! Фильтры чтения для каталога шоу и расписания сеансов, а также
//! постраничная выдача бронирований.
//!
//! Фильтры разбираются из query-параметров один раз и затем применяются
//! любым хранилищем: Postgres переводит их в SQL, память через `matches`.

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::AppError;
use crate::models::{AstronomyShow, ShowSession};

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// `?title=orion&show_themes=2,5`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShowFilter {
    pub title: Option<String>,
    pub show_themes: Vec<i64>,
}

impl ShowFilter {
    pub fn from_params(title: Option<&str>, show_themes: Option<&str>) -> Result<Self, AppError> {
        let title = title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        let show_themes = match show_themes {
            Some(raw) if !raw.trim().is_empty() => parse_ids(raw)?,
            _ => Vec::new(),
        };

        Ok(Self { title, show_themes })
    }

    /// Регистронезависимое вхождение подстроки в название и хотя бы одна
    /// из перечисленных тем.
    pub fn matches(&self, show: &AstronomyShow) -> bool {
        if let Some(ref needle) = self.title {
            if !show.title.to_lowercase().contains(&needle.to_lowercase()) {
                return false;
            }
        }
        self.show_themes.is_empty() || show.has_any_theme(&self.show_themes)
    }

    /// Шаблон для `ILIKE ... ESCAPE '\'`.
    pub fn title_pattern(&self) -> Option<String> {
        self.title.as_deref().map(|t| {
            let escaped = t
                .replace('\\', "\\\\")
                .replace('%', "\\%")
                .replace('_', "\\_");
            format!("%{}%", escaped)
        })
    }
}

/// `?date=2024-03-30&astronomy_show=2`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionFilter {
    pub date: Option<NaiveDate>,
    pub astronomy_show: Option<i64>,
}

impl SessionFilter {
    /// Пустые параметры (`?astronomy_show=`) означают отсутствие фильтра.
    pub fn from_params(date: Option<&str>, astronomy_show: Option<&str>) -> Result<Self, AppError> {
        let date = match date.map(str::trim).filter(|d| !d.is_empty()) {
            Some(raw) => Some(NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
                AppError::Validation(format!("date must be in YYYY-MM-DD format, got {:?}", raw))
            })?),
            None => None,
        };
        let astronomy_show = match astronomy_show.map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => Some(raw.parse::<i64>().map_err(|_| {
                AppError::Validation(format!("astronomy_show must be an id, got {:?}", raw))
            })?),
            None => None,
        };
        Ok(Self {
            date,
            astronomy_show,
        })
    }

    /// Дата сравнивается по календарному дню времени показа в UTC.
    pub fn matches(&self, session: &ShowSession) -> bool {
        if let Some(date) = self.date {
            if session.show_time.date_naive() != date {
                return false;
            }
        }
        match self.astronomy_show {
            Some(show_id) => session.astronomy_show_id == show_id,
            None => true,
        }
    }

    /// Ключ для кеша списка сеансов.
    pub fn cache_key(&self) -> String {
        format!(
            "sessions:date={}&show={}",
            self.date.map(|d| d.to_string()).unwrap_or_default(),
            self.astronomy_show.map(|s| s.to_string()).unwrap_or_default()
        )
    }
}

fn parse_ids(raw: &str) -> Result<Vec<i64>, AppError> {
    let mut ids = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let id = part
            .parse::<i64>()
            .map_err(|_| AppError::Validation(format!("show_themes must be a comma-separated list of ids, got {:?}", part)))?;
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Ok(ids)
}

/// Номер страницы (с единицы) и её размер.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    pub fn new(page: Option<u32>, page_size: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            page_size: page_size
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.page_size)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.page_size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub count: i64,
    pub next: Option<u32>,
    pub previous: Option<u32>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(request: PageRequest, count: i64, results: Vec<T>) -> Self {
        let seen = request.offset() + results.len() as i64;
        Self {
            count,
            next: (seen < count).then(|| request.page.saturating_add(1)),
            previous: (request.page > 1).then_some(request.page - 1),
            results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ShowTheme;
    use chrono::{TimeZone, Utc};

    fn show(title: &str, themes: &[i64]) -> AstronomyShow {
        AstronomyShow {
            id: 1,
            title: title.to_string(),
            description: String::new(),
            show_themes: themes
                .iter()
                .map(|&id| ShowTheme { id, name: format!("theme-{}", id) })
                .collect(),
            image: None,
        }
    }

    #[test]
    fn title_filter_ignores_case() {
        let filter = ShowFilter::from_params(Some("orion"), None).unwrap();
        assert!(filter.matches(&show("The ORION Nebula", &[])));
        assert!(filter.matches(&show("orion's belt", &[])));
        assert!(!filter.matches(&show("Andromeda", &[])));
    }

    #[test]
    fn themes_and_title_combine_with_and() {
        let filter = ShowFilter::from_params(Some("orion"), Some("2, 5")).unwrap();
        assert_eq!(filter.show_themes, vec![2, 5]);
        assert!(filter.matches(&show("Orion", &[5, 7])));
        assert!(!filter.matches(&show("Orion", &[7])));
        assert!(!filter.matches(&show("Andromeda", &[2])));
    }

    #[test]
    fn rejects_malformed_theme_ids() {
        let err = ShowFilter::from_params(None, Some("2,x")).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn title_pattern_escapes_wildcards() {
        let filter = ShowFilter::from_params(Some("50%_off"), None).unwrap();
        assert_eq!(filter.title_pattern().as_deref(), Some("%50\\%\\_off%"));
    }

    #[test]
    fn session_filter_matches_calendar_date_and_show() {
        let filter = SessionFilter::from_params(Some("2024-03-30"), Some("4")).unwrap();
        let session = ShowSession {
            id: 1,
            astronomy_show_id: 4,
            planetarium_dome_id: 1,
            show_time: Utc.with_ymd_and_hms(2024, 3, 30, 23, 59, 0).unwrap(),
        };
        assert!(filter.matches(&session));

        let next_day = ShowSession {
            show_time: Utc.with_ymd_and_hms(2024, 3, 31, 0, 0, 0).unwrap(),
            ..session.clone()
        };
        assert!(!filter.matches(&next_day));

        let other_show = ShowSession {
            astronomy_show_id: 5,
            ..session
        };
        assert!(!filter.matches(&other_show));
    }

    #[test]
    fn session_filter_rejects_bad_date() {
        assert!(SessionFilter::from_params(Some("30.03.2024"), None).is_err());
        assert_eq!(SessionFilter::from_params(Some(""), None).unwrap(), SessionFilter::default());
    }

    #[test]
    fn empty_show_param_means_no_filter() {
        assert_eq!(
            SessionFilter::from_params(None, Some("")).unwrap(),
            SessionFilter::default()
        );
        assert_eq!(
            SessionFilter::from_params(None, Some(" 7 ")).unwrap().astronomy_show,
            Some(7)
        );
        assert!(matches!(
            SessionFilter::from_params(None, Some("abc")),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn page_request_clamps_size() {
        assert_eq!(PageRequest::new(None, None).page_size, 10);
        assert_eq!(PageRequest::new(Some(0), Some(500)), PageRequest { page: 1, page_size: 100 });

        let request = PageRequest::new(Some(3), Some(10));
        assert_eq!(request.offset(), 20);
    }

    #[test]
    fn page_links() {
        let page = Page::new(PageRequest::new(Some(1), Some(10)), 25, vec![0; 10]);
        assert_eq!(page.next, Some(2));
        assert_eq!(page.previous, None);

        let last = Page::new(PageRequest::new(Some(3), Some(10)), 25, vec![0; 5]);
        assert_eq!(last.next, None);
        assert_eq!(last.previous, Some(2));
    }

    #[test]
    fn last_possible_page_does_not_overflow() {
        let request = PageRequest::new(Some(u32::MAX), None);
        let page = Page::new(request, i64::MAX, vec![0; 10]);
        assert_eq!(page.next, Some(u32::MAX));
        assert_eq!(page.previous, Some(u32::MAX - 1));

        let empty: Page<i32> = Page::new(request, 3, vec![]);
        assert_eq!(empty.next, None);
    }
}
