use anyhow::{anyhow, Context, Result};

use crate::dao::{WidgetInsert, WidgetRow};
use crate::types::{ImagePayload, TextPayload};
use crate::widgets::{Widget, WidgetBody, WidgetKind};

pub fn widget_insert_from(id: String, scope: &str, widget: &Widget) -> Result<WidgetInsert> {
    let (kind, payload) = match &widget.body {
        WidgetBody::Text { text } => (WidgetKind::Text, serde_json::to_string(&TextPayload { text: text.clone() })?),
        WidgetBody::Image { images } => {
            (WidgetKind::Image, serde_json::to_string(&ImagePayload { images: images.clone() })?)
        }
        WidgetBody::Other { kind } => return Err(anyhow!("cannot write widget of unsupported type {kind:?}")),
    };
    Ok(WidgetInsert {
        id,
        scope: scope.to_string(),
        name: widget.name.clone(),
        kind: kind.as_str().to_string(),
        payload,
    })
}

pub fn widget_from_row(row: WidgetRow) -> Result<Widget> {
    let body = match row.kind.as_str() {
        "text" => {
            let p: TextPayload = serde_json::from_str(&row.payload)
                .with_context(|| format!("decoding text widget {}", row.id))?;
            WidgetBody::Text { text: p.text }
        }
        "image" => {
            let p: ImagePayload = serde_json::from_str(&row.payload)
                .with_context(|| format!("decoding image widget {}", row.id))?;
            WidgetBody::Image { images: p.images }
        }
        _ => WidgetBody::Other { kind: row.kind.clone() },
    };
    Ok(Widget { id: Some(row.id), name: row.name, body })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::widgets::ImageData;

    #[test]
    fn text_widget_maps_both_ways() {
        let w = Widget::text("Notes", "line one\nline two");
        let ins = widget_insert_from("w1".into(), "main", &w).unwrap();
        assert_eq!(ins.kind, "text");
        assert_eq!(ins.scope, "main");

        let back = widget_from_row(WidgetRow { id: ins.id, name: ins.name, kind: ins.kind, payload: ins.payload }).unwrap();
        assert_eq!(back, w.with_id("w1"));
    }

    #[test]
    fn unknown_kind_reads_as_other() {
        let row = WidgetRow { id: "c1".into(), name: "Events".into(), kind: "calendar".into(), payload: "{}".into() };
        let w = widget_from_row(row).unwrap();
        assert_eq!(w.body, WidgetBody::Other { kind: "calendar".into() });
    }

    #[test]
    fn other_kind_is_not_writable() {
        let w = Widget { id: None, name: "Events".into(), body: WidgetBody::Other { kind: "calendar".into() } };
        assert!(widget_insert_from("x".into(), "main", &w).is_err());
    }

    #[test]
    fn image_payload_keeps_geometry() {
        let image = ImageData { url: "https://m/1".into(), link_url: Some("https://site".into()), width: 300, height: 120 };
        let ins = widget_insert_from("i1".into(), "main", &Widget::image("Banner", image.clone())).unwrap();
        let back = widget_from_row(WidgetRow { id: ins.id, name: ins.name, kind: ins.kind, payload: ins.payload }).unwrap();
        assert_eq!(back.body, WidgetBody::Image { images: vec![image] });
    }
}
