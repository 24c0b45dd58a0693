use lopdf::{Dictionary, Document, Object, ObjectId, StringFormat};
use tracing::debug;

use super::PdfError;

/// Guards the `/Parent` walk against cyclic field trees.
const MAX_DEPTH: usize = 64;

/// A fillable template addressed purely by field name.
pub trait FormTemplate {
    type Widget: Copy;

    /// First widget whose qualified name equals `name`, scanning pages in order.
    fn find_widget(&self, name: &str) -> Option<Self::Widget>;

    fn set_text(&mut self, widget: Self::Widget, value: &str) -> Result<(), PdfError>;

    /// Sets every widget of the field to its own declared on-state, or to `Off`.
    fn set_checkbox(&mut self, widget: Self::Widget, checked: bool) -> Result<(), PdfError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Button,
    Choice,
    Signature,
    Unknown,
}

impl FieldKind {
    fn from_pdf_name(name: &[u8]) -> Self {
        match name {
            b"Tx" => Self::Text,
            b"Btn" => Self::Button,
            b"Ch" => Self::Choice,
            b"Sig" => Self::Signature,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Button => "button",
            Self::Choice => "choice",
            Self::Signature => "signature",
            Self::Unknown => "unknown",
        }
    }
}

/// Handle to one widget annotation and the field dictionary that owns its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WidgetRef {
    widget: ObjectId,
    field: ObjectId,
}

#[derive(Debug, Clone)]
pub struct WidgetInfo {
    /// 1-based page number.
    pub page: u32,
    /// Fully qualified field name (`parent.child`).
    pub name: String,
    pub kind: FieldKind,
    /// Appearance state used for "checked", if the widget declares one.
    pub on_state: Option<String>,
    handle: WidgetRef,
}

/// AcroForm template loaded with `lopdf`.
pub struct PdfForm {
    doc: Document,
    widgets: Vec<WidgetInfo>,
}

impl PdfForm {
    pub fn open(bytes: &[u8]) -> Result<Self, PdfError> {
        let doc = Document::load_mem(bytes)?;
        let widgets = scan_widgets(&doc);
        debug!(widgets = widgets.len(), "template widgets indexed");
        Ok(Self { doc, widgets })
    }

    /// Every widget in page order, duplicates included.
    pub fn fields(&self) -> &[WidgetInfo] {
        &self.widgets
    }

    /// Current `/V` of the first widget named `name`.
    pub fn value(&self, name: &str) -> Option<String> {
        let w = self.find_widget(name)?;
        let dict = self.doc.get_dictionary(w.field).ok()?;
        match resolve(&self.doc, dict.get(b"V").ok()?) {
            Object::String(bytes, _) => Some(decode_pdf_string(bytes)),
            Object::Name(name) => Some(String::from_utf8_lossy(name).into_owned()),
            _ => None,
        }
    }

    /// Serialize with deflate-compressed streams. The source bytes are untouched.
    pub fn save(mut self) -> Result<Vec<u8>, PdfError> {
        self.mark_need_appearances()?;
        self.doc.compress();
        let mut buf = Vec::new();
        self.doc.save_to(&mut buf)?;
        Ok(buf)
    }

    /// Ask viewers to rebuild appearance streams for the values we wrote.
    fn mark_need_appearances(&mut self) -> Result<(), PdfError> {
        let Ok(root) = self.doc.trailer.get(b"Root").and_then(Object::as_reference) else {
            return Ok(());
        };
        let acroform = match self.doc.get_dictionary(root)?.get(b"AcroForm") {
            Ok(Object::Reference(id)) => Some(*id),
            Ok(_) => None,
            Err(_) => return Ok(()),
        };
        match acroform {
            Some(id) => self.doc.get_dictionary_mut(id)?.set("NeedAppearances", true),
            None => {
                if let Ok(Object::Dictionary(d)) =
                    self.doc.get_dictionary_mut(root)?.get_mut(b"AcroForm")
                {
                    d.set("NeedAppearances", true);
                }
            }
        }
        Ok(())
    }
}

impl FormTemplate for PdfForm {
    type Widget = WidgetRef;

    fn find_widget(&self, name: &str) -> Option<WidgetRef> {
        self.widgets.iter().find(|w| w.name == name).map(|w| w.handle)
    }

    fn set_text(&mut self, widget: WidgetRef, value: &str) -> Result<(), PdfError> {
        self.doc
            .get_dictionary_mut(widget.field)?
            .set("V", encode_text(value));
        Ok(())
    }

    fn set_checkbox(&mut self, widget: WidgetRef, checked: bool) -> Result<(), PdfError> {
        // Every widget of the field gets its own appearance state.
        let states: Vec<(ObjectId, Vec<u8>)> = self
            .widgets
            .iter()
            .filter(|w| w.handle.field == widget.field)
            .map(|w| {
                let state = match (&w.on_state, checked) {
                    (Some(on), true) => on.as_str(),
                    (None, true) => "Yes",
                    (_, false) => "Off",
                };
                (w.handle.widget, state.as_bytes().to_vec())
            })
            .collect();

        let value = states
            .iter()
            .find(|(id, _)| *id == widget.widget)
            .map(|(_, state)| state.clone())
            .unwrap_or_else(|| if checked { b"Yes".to_vec() } else { b"Off".to_vec() });
        self.doc
            .get_dictionary_mut(widget.field)?
            .set("V", Object::Name(value));

        for (id, state) in states {
            self.doc.get_dictionary_mut(id)?.set("AS", Object::Name(state));
        }
        Ok(())
    }
}

fn scan_widgets(doc: &Document) -> Vec<WidgetInfo> {
    let mut widgets = Vec::new();

    for (page, page_id) in doc.get_pages() {
        let Ok(page_dict) = doc.get_dictionary(page_id) else {
            continue;
        };
        let Some(annots) = page_dict
            .get(b"Annots")
            .ok()
            .and_then(|a| resolve(doc, a).as_array().ok())
        else {
            continue;
        };

        for annot in annots {
            let Object::Reference(widget_id) = annot else {
                continue;
            };
            let Ok(dict) = doc.get_dictionary(*widget_id) else {
                continue;
            };
            if !matches!(dict.get(b"Subtype").and_then(Object::as_name), Ok(b"Widget")) {
                continue;
            }
            let Some((field_id, name)) = qualified_name(doc, *widget_id) else {
                continue;
            };
            let kind = inherited(doc, *widget_id, b"FT")
                .and_then(|ft| ft.as_name().ok())
                .map(FieldKind::from_pdf_name)
                .unwrap_or(FieldKind::Unknown);

            widgets.push(WidgetInfo {
                page,
                name,
                kind,
                on_state: on_state(doc, dict),
                handle: WidgetRef {
                    widget: *widget_id,
                    field: field_id,
                },
            });
        }
    }

    widgets
}

/// Join `/T` along the `/Parent` chain. Returns the nearest dictionary carrying
/// a `/T` (the field that owns `/V`) and the dotted name.
fn qualified_name(doc: &Document, id: ObjectId) -> Option<(ObjectId, String)> {
    let mut parts = Vec::new();
    let mut owner = None;
    let mut current = Some(id);

    for _ in 0..MAX_DEPTH {
        let Some(cur) = current else { break };
        let Ok(dict) = doc.get_dictionary(cur) else {
            break;
        };
        if let Some(t) = text_string(doc, dict, b"T") {
            owner.get_or_insert(cur);
            parts.push(t);
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
    }

    parts.reverse();
    owner.map(|o| (o, parts.join(".")))
}

/// Look `key` up on the widget, then on its ancestors.
fn inherited<'a>(doc: &'a Document, id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = Some(id);
    for _ in 0..MAX_DEPTH {
        let dict = doc.get_dictionary(current?).ok()?;
        if let Ok(v) = dict.get(key) {
            return Some(resolve(doc, v));
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
    }
    None
}

/// The non-`Off` key of `/AP /N`.
fn on_state(doc: &Document, widget: &Dictionary) -> Option<String> {
    let ap = resolve(doc, widget.get(b"AP").ok()?).as_dict().ok()?;
    let normal = resolve(doc, ap.get(b"N").ok()?).as_dict().ok()?;
    normal
        .iter()
        .map(|(k, _)| k)
        .find(|k| k.as_slice() != b"Off")
        .map(|k| String::from_utf8_lossy(k).into_owned())
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        other => other,
    }
}

fn text_string(doc: &Document, dict: &Dictionary, key: &[u8]) -> Option<String> {
    match resolve(doc, dict.get(key).ok()?) {
        Object::String(bytes, _) => Some(decode_pdf_string(bytes)).filter(|s| !s.is_empty()),
        _ => None,
    }
}

fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE_u8, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    }
}

/// ASCII goes in as a literal; anything else as UTF-16BE with BOM.
fn encode_text(value: &str) -> Object {
    if value.is_ascii() {
        return Object::string_literal(value);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in value.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

/// Two-page template: a text field repeated on both pages, a checkbox with a
/// custom on-state, a checkbox without appearances, a hierarchical field, and
/// the date field.
#[cfg(test)]
pub(crate) fn sample_template() -> Vec<u8> {
    use lopdf::{dictionary, Stream};

    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let page1_id = doc.new_object_id();
    let page2_id = doc.new_object_id();

    let text = |doc: &mut Document, name: &str, page: ObjectId| {
        doc.add_object(dictionary! {
            "Type" => "Annot",
            "Subtype" => "Widget",
            "FT" => "Tx",
            "T" => Object::string_literal(name),
            "Rect" => vec![50.into(), 700.into(), 200.into(), 720.into()],
            "P" => page,
        })
    };

    let on_ap = doc.add_object(Stream::new(dictionary! {}, b"0 g".to_vec()));
    let off_ap = doc.add_object(Stream::new(dictionary! {}, b"1 g".to_vec()));
    let storage_cb = doc.add_object(dictionary! {
        "Type" => "Annot",
        "Subtype" => "Widget",
        "FT" => "Btn",
        "T" => Object::string_literal("Speicher_vorhanden"),
        "V" => "Off",
        "AS" => "Off",
        "AP" => dictionary! {
            "N" => dictionary! { "Off" => off_ap, "Ja" => on_ap },
        },
        "Rect" => vec![50.into(), 650.into(), 70.into(), 670.into()],
        "P" => page1_id,
    });
    let pv_cb = doc.add_object(dictionary! {
        "Type" => "Annot",
        "Subtype" => "Widget",
        "FT" => "Btn",
        "T" => Object::string_literal("PV_Anlage"),
        "Rect" => vec![50.into(), 600.into(), 70.into(), 620.into()],
        "P" => page1_id,
    });

    let name1 = text(&mut doc, "Name", page1_id);
    let date = text(&mut doc, "Datum", page1_id);
    let kwh = text(&mut doc, "Speicher_kWh", page1_id);
    let name2 = text(&mut doc, "Name", page2_id);

    let kunde_id = doc.new_object_id();
    let phone = doc.add_object(dictionary! {
        "Type" => "Annot",
        "Subtype" => "Widget",
        "T" => Object::string_literal("Telefon"),
        "Parent" => kunde_id,
        "Rect" => vec![50.into(), 550.into(), 200.into(), 570.into()],
        "P" => page2_id,
    });
    doc.objects.insert(
        kunde_id,
        Object::Dictionary(dictionary! {
            "FT" => "Tx",
            "T" => Object::string_literal("Kunde"),
            "Kids" => vec![phone.into()],
        }),
    );

    doc.objects.insert(
        page1_id,
        Object::Dictionary(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Annots" => vec![name1.into(), storage_cb.into(), pv_cb.into(), date.into(), kwh.into()],
        }),
    );
    doc.objects.insert(
        page2_id,
        Object::Dictionary(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Annots" => vec![name2.into(), phone.into()],
        }),
    );
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page1_id.into(), page2_id.into()],
            "Count" => 2,
        }),
    );

    let acroform_id = doc.add_object(dictionary! {
        "Fields" => vec![
            name1.into(), storage_cb.into(), pv_cb.into(), date.into(),
            kwh.into(), name2.into(), kunde_id.into(),
        ],
    });
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
        "AcroForm" => acroform_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}
