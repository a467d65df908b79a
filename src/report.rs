use std::{collections::BTreeMap, fs::File, path::Path};

use printpdf::{IndirectFontRef, Mm, PdfDocument, PdfDocumentReference};

use crate::{
    constants::SHOPPING_LIST_TITLE,
    error::{Error, HttpError},
    schema::ShoppingListPart,
};

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN_LEFT: f32 = 20.0;
const TITLE_Y: f32 = 277.0;
const CONTENT_Y: f32 = 265.0;
const LINE_OFFSET: f32 = 7.0;
const TITLE_SIZE: f32 = 16.0;
const CONTENT_SIZE: f32 = 12.0;

/// Builtin PDF fonts only cover WinAnsi, so a Cyrillic capable face ships with
/// the binary.
const BUNDLED_FONT: &[u8] = include_bytes!("../assets/fonts/DejaVuSans.ttf");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShoppingListLine {
    pub name: String,
    pub measurement_unit: String,
    pub total_amount: i64,
}

impl ShoppingListLine {
    pub fn text(&self) -> String {
        format!(
            "{} {}.  {};",
            self.total_amount, self.measurement_unit, self.name
        )
    }
}

/// Sums amounts per (name, unit), ordered by name.
pub fn aggregate(parts: Vec<ShoppingListPart>) -> Vec<ShoppingListLine> {
    let mut totals: BTreeMap<(String, String), i64> = BTreeMap::new();
    for part in parts {
        *totals
            .entry((part.name, part.measurement_unit))
            .or_default() += i64::from(part.amount);
    }

    totals
        .into_iter()
        .map(|((name, measurement_unit), total_amount)| ShoppingListLine {
            name,
            measurement_unit,
            total_amount,
        })
        .collect()
}

/// Text and baseline (mm from the page bottom) of every row, title first.
/// Rows past the page bottom keep their negative baseline and are clipped.
pub fn layout(lines: &[ShoppingListLine]) -> Vec<(String, f32, f32)> {
    let mut rows = vec![(SHOPPING_LIST_TITLE.to_string(), TITLE_Y, TITLE_SIZE)];

    rows.extend(lines.iter().enumerate().map(|(i, line)| {
        (
            line.text(),
            CONTENT_Y - LINE_OFFSET * i as f32,
            CONTENT_SIZE,
        )
    }));

    rows
}

fn load_font(doc: &PdfDocumentReference, font: Option<&Path>) -> Result<IndirectFontRef, Error> {
    let loaded = match font {
        Some(path) => {
            let file = File::open(path).map_err(|e| {
                HttpError::InternalServerError
                    .new(&format!("Failed to open font {}: {e}", path.display()))
            })?;
            doc.add_external_font(file)
        }
        None => doc.add_external_font(BUNDLED_FONT),
    };

    loaded.map_err(|e| HttpError::InternalServerError.new(&format!("Failed to load font: {e:?}")))
}

/// Renders the shopping list onto a single A4 page.
pub fn render_shopping_list(
    lines: &[ShoppingListLine],
    font: Option<&Path>,
) -> Result<Vec<u8>, Error> {
    let (doc, page, layer) = PdfDocument::new(
        SHOPPING_LIST_TITLE,
        Mm(PAGE_WIDTH),
        Mm(PAGE_HEIGHT),
        "Layer 1",
    );
    let font = load_font(&doc, font)?;
    let layer = doc.get_page(page).get_layer(layer);

    for (text, y, size) in layout(lines) {
        layer.use_text(text, size, Mm(MARGIN_LEFT), Mm(y), &font);
    }

    doc.save_to_bytes().map_err(|e| {
        HttpError::InternalServerError.new(&format!("Failed to render shopping list: {e:?}"))
    })
}
