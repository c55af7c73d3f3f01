//! One-page PDF certificate. Rendering is best-effort: a failure here is
//! logged by the caller and never reverts a certification.

use std::io::BufWriter;

use printpdf::*;
use thiserror::Error;

use crate::models::enums::ModuleId;
use crate::models::{Application, ModuleField};

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("PDF font error: {0}")]
    Font(String),

    #[error("PDF save error: {0}")]
    Save(String),

    #[error("Application {0} is not certified")]
    NotCertified(uuid::Uuid),
}

const MAX_LINE_CHARS: usize = 90;

fn display_value(field: &ModuleField) -> String {
    let text = match &field.value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => "-".into(),
        other => other.to_string(),
    };
    if text.chars().count() > MAX_LINE_CHARS {
        let cut: String = text.chars().take(MAX_LINE_CHARS - 3).collect();
        format!("{cut}...")
    } else {
        text
    }
}

/// Render the certificate for a certified application. Returns PDF bytes.
pub fn render_certificate(app: &Application, fields: &[ModuleField]) -> Result<Vec<u8>, RenderError> {
    let (Some(certified_by), Some(certified_at)) = (app.certified_by, app.certified_at) else {
        return Err(RenderError::NotCertified(app.id));
    };

    let title = "Agricultural Loan Certification";
    let (doc, page1, layer1) = PdfDocument::new(title, Mm(210.0), Mm(297.0), "Layer 1");
    let mut layer = doc.get_page(page1).get_layer(layer1);
    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| RenderError::Font(e.to_string()))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| RenderError::Font(e.to_string()))?;

    let mut y = Mm(280.0);
    layer.use_text(title, 16.0, Mm(20.0), y, &bold);
    y -= Mm(10.0);
    layer.use_text(format!("Application: {}", app.id), 9.0, Mm(20.0), y, &font);
    y -= Mm(5.0);
    layer.use_text(format!("Certified by: {certified_by}"), 9.0, Mm(20.0), y, &font);
    y -= Mm(5.0);
    layer.use_text(
        format!("Certified at: {}", certified_at.format("%Y-%m-%d %H:%M UTC")),
        9.0,
        Mm(20.0),
        y,
        &font,
    );
    y -= Mm(10.0);

    for module in ModuleId::all() {
        let rows: Vec<&ModuleField> = fields.iter().filter(|f| f.module == *module).collect();
        if rows.is_empty() {
            continue;
        }
        if y < Mm(30.0) {
            let (page, next_layer) = doc.add_page(Mm(210.0), Mm(297.0), "Layer 1");
            layer = doc.get_page(page).get_layer(next_layer);
            y = Mm(280.0);
        }
        layer.use_text(
            format!("{} - {}", module.as_str().to_ascii_uppercase(), module.title()),
            11.0,
            Mm(20.0),
            y,
            &bold,
        );
        y -= Mm(6.0);
        for field in rows {
            if y < Mm(20.0) {
                let (page, next_layer) = doc.add_page(Mm(210.0), Mm(297.0), "Layer 1");
                layer = doc.get_page(page).get_layer(next_layer);
                y = Mm(280.0);
            }
            let line = format!("{}: {} [{}]", field.field_name, display_value(field), field.source);
            layer.use_text(line, 9.0, Mm(25.0), y, &font);
            y -= Mm(4.5);
        }
        y -= Mm(4.0);
    }

    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf).map_err(|e| RenderError::Save(e.to_string()))?;
    buf.into_inner().map_err(|e| RenderError::Save(e.to_string()))
}
