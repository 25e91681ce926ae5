use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::AppError;

/// Купол планетария в том виде, в каком он хранится в БД.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Dome {
    pub id: i64,
    pub name: String,
    pub rows: i32,
    pub seats_in_row: i32,
}

impl Dome {
    /// Геометрия зала. Хранилище не пропускает неположительные размеры,
    /// но повреждённая запись всё равно даст `InvalidGeometry`, а не панику.
    pub fn geometry(&self) -> Result<DomeGeometry, AppError> {
        DomeGeometry::new(self.rows, self.seats_in_row)
    }

    pub fn capacity(&self) -> i64 {
        i64::from(self.rows) * i64::from(self.seats_in_row)
    }
}

/// Сетка мест купола: `rows` рядов по `seats_in_row` мест.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomeGeometry {
    rows: i32,
    seats_in_row: i32,
}

impl DomeGeometry {
    pub fn new(rows: i32, seats_in_row: i32) -> Result<Self, AppError> {
        if rows < 1 || seats_in_row < 1 {
            return Err(AppError::InvalidGeometry { rows, seats_in_row });
        }
        Ok(Self { rows, seats_in_row })
    }

    pub fn rows(&self) -> i32 {
        self.rows
    }

    pub fn seats_in_row(&self) -> i32 {
        self.seats_in_row
    }

    pub fn capacity(&self) -> i64 {
        i64::from(self.rows) * i64::from(self.seats_in_row)
    }

    pub fn is_valid_coordinate(&self, row: i32, seat: i32) -> bool {
        (1..=self.rows).contains(&row) && (1..=self.seats_in_row).contains(&seat)
    }

    /// Таблица допустимых границ для каждого атрибута билета.
    pub fn bounds(&self) -> [(&'static str, i32); 2] {
        [("row", self.rows), ("seat", self.seats_in_row)]
    }

    /// Проверяет координату и называет первый атрибут, вышедший за границы.
    pub fn check_coordinate(&self, row: i32, seat: i32) -> Result<(), AppError> {
        for ((field, max), value) in self.bounds().into_iter().zip([row, seat]) {
            if !(1..=max).contains(&value) {
                return Err(AppError::OutOfRange { field, max });
            }
        }
        Ok(())
    }
}

/// Данные для создания купола, уже прошедшие проверку геометрии.
#[derive(Debug, Clone)]
pub struct NewDome {
    pub name: String,
    pub geometry: DomeGeometry,
}

impl NewDome {
    pub fn new(name: impl Into<String>, rows: i32, seats_in_row: i32) -> Result<Self, AppError> {
        Ok(Self {
            name: name.into(),
            geometry: DomeGeometry::new(rows, seats_in_row)?,
        })
    }
}
