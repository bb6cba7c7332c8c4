use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, TransactionBehavior};
use serde::Serialize;

use crate::db::format_timestamp;
use crate::db::models::CoverSlide;
use crate::error::AppResult;
use crate::media::AssetStore;

pub const SLOTS: usize = 3;

/// Per-slot changes. Text values are taken as sent; numeric ones are parsed
/// when applied and dropped if they are not numbers.
#[derive(Debug, Clone, Default)]
pub struct SlotInput {
    /// Stored path of a newly uploaded image.
    pub image: Option<String>,
    pub clear: bool,
    pub caption: String,
    pub bibliography: String,
    pub text_x: Option<String>,
    pub text_y: Option<String>,
    pub text_size: Option<String>,
    pub text_color: Option<String>,
    pub text_font: Option<String>,
    pub effect: Option<String>,
}

impl SlotInput {
    /// Read the `slide{n}_*` fields for slot `index`. The image is attached
    /// separately once uploaded.
    pub fn from_fields(fields: &HashMap<String, String>, index: usize) -> Self {
        let get = |name: &str| fields.get(&format!("slide{index}_{name}")).cloned();
        Self {
            image: None,
            clear: get("clear").is_some_and(|v| is_truthy(&v)),
            caption: get("caption").unwrap_or_default(),
            bibliography: get("bibliography").unwrap_or_default(),
            text_x: get("text_x"),
            text_y: get("text_y"),
            text_size: get("text_size"),
            text_color: get("color"),
            text_font: get("font"),
            effect: get("effect"),
        }
    }

    fn apply(self, slide: &mut CoverSlide, caption: &str, bibliography: &str, removed: &mut Vec<String>) {
        if self.clear {
            removed.extend(slide.image.take());
        }
        if let Some(image) = self.image {
            removed.extend(slide.image.replace(image));
        }

        if let Some(caption) = fallback(&self.caption, caption) {
            slide.caption = caption.to_string();
        }
        if let Some(bibliography) = fallback(&self.bibliography, bibliography) {
            slide.bibliography = bibliography.to_string();
        }

        if let Some(x) = parse_number(self.text_x.as_deref()) {
            slide.text_x = Some(x);
        }
        if let Some(y) = parse_number(self.text_y.as_deref()) {
            slide.text_y = Some(y);
        }
        if let Some(size) = parse_number(self.text_size.as_deref()) {
            slide.text_size = Some(size);
        }
        if let Some(color) = self.text_color {
            slide.text_color = color;
        }
        if let Some(font) = self.text_font {
            slide.text_font = font;
        }
        if let Some(effect) = self.effect {
            slide.effect = effect;
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SlidesUpdate {
    /// Applied to every slot that does not send its own.
    pub caption: String,
    pub bibliography: String,
    pub slots: [SlotInput; SLOTS],
}

#[derive(Debug, Clone, Serialize)]
pub struct CoverSlideView {
    pub id: i64,
    pub index: u8,
    pub image: Option<String>,
    pub caption: String,
    pub bibliography: String,
    pub text_color: String,
    pub text_font: String,
    pub text_x: Option<f64>,
    pub text_y: Option<f64>,
    pub text_size: Option<f64>,
    pub effect: String,
    pub updated_at: DateTime<Utc>,
}

impl CoverSlideView {
    pub fn new(slide: CoverSlide, assets: &dyn AssetStore) -> Self {
        Self {
            id: slide.id,
            index: slide.index,
            image: assets.resolve(slide.image.as_deref()),
            caption: slide.caption,
            bibliography: slide.bibliography,
            text_color: slide.text_color,
            text_font: slide.text_font,
            text_x: slide.text_x,
            text_y: slide.text_y,
            text_size: slide.text_size,
            effect: slide.effect,
            updated_at: slide.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SlidesView {
    pub results: Vec<CoverSlideView>,
    pub caption: String,
    pub bibliography: String,
}

pub fn list(conn: &Connection, user_id: i64) -> AppResult<Vec<CoverSlide>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM cover_slides WHERE user_id = ?1 ORDER BY idx",
        CoverSlide::COLUMNS
    ))?;
    let slides = stmt
        .query_map(params![user_id], CoverSlide::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(slides)
}

/// Apply `update` to all three slots in one transaction. Returns the slides
/// in index order and the stored paths that are no longer referenced.
pub fn replace(
    conn: &mut Connection,
    user_id: i64,
    update: SlidesUpdate,
    at: DateTime<Utc>,
) -> AppResult<(Vec<CoverSlide>, Vec<String>)> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let stamp = format_timestamp(at);
    let caption = update.caption.trim();
    let bibliography = update.bibliography.trim();

    let mut slides = Vec::with_capacity(SLOTS);
    let mut removed = Vec::new();
    for (index, slot) in update.slots.into_iter().enumerate() {
        tx.execute(
            "INSERT INTO cover_slides (user_id, idx, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id, idx) DO NOTHING",
            params![user_id, index as i64, stamp],
        )?;
        let mut slide = tx.query_row(
            &format!(
                "SELECT {} FROM cover_slides WHERE user_id = ?1 AND idx = ?2",
                CoverSlide::COLUMNS
            ),
            params![user_id, index as i64],
            CoverSlide::from_row,
        )?;

        slot.apply(&mut slide, caption, bibliography, &mut removed);
        slide.updated_at = at;

        tx.execute(
            "UPDATE cover_slides SET image = ?2, caption = ?3, bibliography = ?4,
                 text_color = ?5, text_font = ?6, text_x = ?7, text_y = ?8,
                 text_size = ?9, effect = ?10, updated_at = ?11
             WHERE id = ?1",
            params![
                slide.id,
                slide.image,
                slide.caption,
                slide.bibliography,
                slide.text_color,
                slide.text_font,
                slide.text_x,
                slide.text_y,
                slide.text_size,
                slide.effect,
                stamp,
            ],
        )?;
        slides.push(slide);
    }
    tx.commit()?;

    tracing::info!(user_id, removed = removed.len(), "Cover slides replaced");
    Ok((slides, removed))
}

fn fallback<'a>(own: &'a str, common: &'a str) -> Option<&'a str> {
    let own = own.trim();
    if !own.is_empty() {
        Some(own)
    } else if !common.is_empty() {
        Some(common)
    } else {
        None
    }
}

fn parse_number(value: Option<&str>) -> Option<f64> {
    value
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|n| n.is_finite())
}

fn is_truthy(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "" | "0" | "false" | "off" | "no"
    )
}
