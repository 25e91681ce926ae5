//! catalog.rs
//!
//! Справочники планетария: купола, темы и астрономические шоу.

use std::sync::Arc;

use tracing::info;

use crate::error::AppError;
use crate::filters::ShowFilter;
use crate::models::{AstronomyShow, Dome, NewAstronomyShow, NewDome, ShowTheme};
use crate::store::Store;

#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn Store>,
}

impl CatalogService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn create_dome(
        &self,
        name: &str,
        rows: i32,
        seats_in_row: i32,
    ) -> Result<Dome, AppError> {
        let dome = NewDome::new(name, rows, seats_in_row)?;
        let dome = self.store.insert_dome(&dome).await?;
        info!(dome_id = dome.id, capacity = dome.capacity(), "Dome created");
        Ok(dome)
    }

    pub async fn list_domes(&self) -> Result<Vec<Dome>, AppError> {
        Ok(self.store.list_domes().await?)
    }

    pub async fn create_theme(&self, name: &str) -> Result<ShowTheme, AppError> {
        Ok(self.store.insert_theme(name).await?)
    }

    pub async fn list_themes(&self) -> Result<Vec<ShowTheme>, AppError> {
        Ok(self.store.list_themes().await?)
    }

    /// Все темы должны существовать, иначе шоу не создаётся.
    pub async fn create_show(&self, show: NewAstronomyShow) -> Result<AstronomyShow, AppError> {
        let existing = self.store.existing_theme_ids(&show.show_themes).await?;
        if let Some(missing) = show.show_themes.iter().find(|id| !existing.contains(id)) {
            return Err(AppError::not_found("show theme", *missing));
        }

        let show = self.store.insert_show(&show).await?;
        info!(astronomy_show_id = show.id, "Astronomy show created");
        Ok(show)
    }

    pub async fn get_show(&self, id: i64) -> Result<AstronomyShow, AppError> {
        self.store
            .get_show(id)
            .await?
            .ok_or_else(|| AppError::not_found("astronomy show", id))
    }

    pub async fn list_shows(&self, filter: &ShowFilter) -> Result<Vec<AstronomyShow>, AppError> {
        Ok(self.store.list_shows(filter).await?)
    }

    /// Привязывает ссылку на картинку из внешнего хранилища.
    pub async fn upload_image(&self, id: i64, image: &str) -> Result<AstronomyShow, AppError> {
        let image = image.trim();
        if image.is_empty() {
            return Err(AppError::Validation("image reference must not be empty".to_string()));
        }
        self.store
            .set_show_image(id, image)
            .await?
            .ok_or_else(|| AppError::not_found("astronomy show", id))
    }

    /// Шоу удаляется только после того, как убраны все его сеансы.
    pub async fn delete_show(&self, id: i64) -> Result<(), AppError> {
        let dependents = self.store.count_sessions_for_show(id).await?;
        if dependents > 0 {
            return Err(AppError::InUse {
                entity: "astronomy show",
                id,
                dependents,
            });
        }

        if !self.store.delete_show(id).await? {
            return Err(AppError::not_found("astronomy show", id));
        }
        info!(astronomy_show_id = id, "Astronomy show deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewShowSession;
    use crate::store::MemoryStore;
    use chrono::{TimeZone, Utc};

    fn catalog() -> (Arc<MemoryStore>, CatalogService) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), CatalogService::new(store))
    }

    fn new_show(title: &str, themes: Vec<i64>) -> NewAstronomyShow {
        NewAstronomyShow {
            title: title.to_string(),
            description: format!("{} description", title),
            show_themes: themes,
        }
    }

    #[tokio::test]
    async fn dome_with_zero_rows_is_rejected() {
        let (_, catalog) = catalog();
        let err = catalog.create_dome("Broken", 0, 10).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidGeometry { rows: 0, .. }));
        assert!(catalog.list_domes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn title_filter_is_case_insensitive() {
        let (_, catalog) = catalog();
        catalog.create_show(new_show("Orion Nebula", vec![])).await.unwrap();
        catalog.create_show(new_show("Return of ORION", vec![])).await.unwrap();
        catalog.create_show(new_show("Saturn Rings", vec![])).await.unwrap();

        let filter = ShowFilter::from_params(Some("orion"), None).unwrap();
        let titles: Vec<String> = catalog
            .list_shows(&filter)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.title)
            .collect();

        assert_eq!(titles, vec!["Orion Nebula", "Return of ORION"]);
    }

    #[tokio::test]
    async fn theme_filter_returns_each_show_once() {
        let (_, catalog) = catalog();
        let stars = catalog.create_theme("Stars").await.unwrap();
        let planets = catalog.create_theme("Planets").await.unwrap();
        let galaxies = catalog.create_theme("Galaxies").await.unwrap();

        catalog
            .create_show(new_show("Tour", vec![stars.id, planets.id]))
            .await
            .unwrap();
        catalog.create_show(new_show("Deep Field", vec![galaxies.id])).await.unwrap();

        let filter = ShowFilter {
            title: None,
            show_themes: vec![stars.id, planets.id],
        };
        let shows = catalog.list_shows(&filter).await.unwrap();
        assert_eq!(shows.len(), 1);
        assert_eq!(shows[0].title, "Tour");
        assert_eq!(shows[0].show_themes.len(), 2);
    }

    #[tokio::test]
    async fn unknown_theme_is_not_found() {
        let (_, catalog) = catalog();
        let err = catalog.create_show(new_show("Tour", vec![42])).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { entity: "show theme", id: 42 }));
    }

    #[tokio::test]
    async fn image_reference_is_attached() {
        let (_, catalog) = catalog();
        let show = catalog.create_show(new_show("Tour", vec![])).await.unwrap();

        let updated = catalog.upload_image(show.id, "shows/tour.jpg").await.unwrap();
        assert_eq!(updated.image.as_deref(), Some("shows/tour.jpg"));

        assert!(matches!(
            catalog.upload_image(show.id, "  ").await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            catalog.upload_image(999, "x.jpg").await,
            Err(AppError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn show_with_sessions_cannot_be_deleted() {
        let (store, catalog) = catalog();
        let dome = catalog.create_dome("Main", 5, 5).await.unwrap();
        let show = catalog.create_show(new_show("Tour", vec![])).await.unwrap();
        store
            .insert_session(&NewShowSession {
                astronomy_show_id: show.id,
                planetarium_dome_id: dome.id,
                show_time: Utc.with_ymd_and_hms(2024, 3, 30, 10, 0, 0).unwrap(),
            })
            .await
            .unwrap();

        let err = catalog.delete_show(show.id).await.unwrap_err();
        assert!(matches!(err, AppError::InUse { dependents: 1, .. }));
        assert!(catalog.get_show(show.id).await.is_ok());

        let lonely = catalog.create_show(new_show("Lonely", vec![])).await.unwrap();
        catalog.delete_show(lonely.id).await.unwrap();
        assert!(matches!(
            catalog.get_show(lonely.id).await,
            Err(AppError::NotFound { .. })
        ));
    }
}
