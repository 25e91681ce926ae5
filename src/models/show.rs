use serde::{Deserialize, Serialize};

use crate::models::ShowTheme;

/// Астрономическое шоу с привязанными темами.
///
/// `image`: непрозрачная ссылка на объект во внешнем хранилище,
/// содержимое картинки сервис никогда не читает.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AstronomyShow {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub show_themes: Vec<ShowTheme>,
    pub image: Option<String>,
}

impl AstronomyShow {
    pub fn has_any_theme(&self, theme_ids: &[i64]) -> bool {
        self.show_themes.iter().any(|t| theme_ids.contains(&t.id))
    }
}

#[derive(Debug, Clone)]
pub struct NewAstronomyShow {
    pub title: String,
    pub description: String,
    pub show_themes: Vec<i64>,
}
