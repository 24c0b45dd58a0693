pub mod fields;
pub mod sections;

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::config::{Config, NAME_LABEL};
use crate::pdf::{self, PdfError, TextSource};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedField {
    pub label: String,
    pub value: String,
}

impl fmt::Display for ExtractedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.label, self.value)
    }
}

/// Section title → fields found in it. Sections with nothing found are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Extraction {
    sections: BTreeMap<String, Vec<ExtractedField>>,
}

impl Extraction {
    pub fn section(&self, header: &str) -> Option<&[ExtractedField]> {
        self.sections.get(header).map(Vec::as_slice)
    }

    pub fn value(&self, header: &str, label: &str) -> Option<&str> {
        self.section(header)?
            .iter()
            .find(|f| f.label == label)
            .map(|f| f.value.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn field_count(&self) -> usize {
        self.sections.values().map(Vec::len).sum()
    }

    fn insert(&mut self, header: &str, fields: Vec<ExtractedField>) {
        if !fields.is_empty() {
            self.sections.insert(header.to_string(), fields);
        }
    }
}

/// Pipeline: header lines → section spans → labelled values (+ name line).
pub fn extract_requested_fields(lines: &[String], config: &Config) -> Extraction {
    let idx = sections::find_header_indices(lines, &config.headers);
    let mut result = Extraction::default();

    for header in &config.headers {
        let Some(span) = sections::section_span(lines, header, &idx) else {
            debug!(%header, "section not found");
            continue;
        };
        let section_lines = &lines[span];
        let mut found = Vec::new();

        if *header == config.name_section {
            if let Some(name) = fields::extract_first_person_name(section_lines, config) {
                found.push(ExtractedField {
                    label: NAME_LABEL.to_string(),
                    value: name,
                });
            }
        }

        for label in config.labels_for(header) {
            match fields::extract_value_after_colon(section_lines, label) {
                Some(value) => found.push(ExtractedField {
                    label: label.clone(),
                    value,
                }),
                None => debug!(%header, %label, "field not found"),
            }
        }

        result.insert(header, found);
    }

    result
}

/// Read a whole document and run the extraction over its lines.
pub fn process_document(
    source: &dyn TextSource,
    bytes: &[u8],
    config: &Config,
) -> Result<Extraction, PdfError> {
    let text = pdf::extract_full_text(source, bytes)?;
    let lines = pdf::split_lines(&text);
    Ok(extract_requested_fields(&lines, config))
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_lines(name: &str) -> Vec<String> {
        let text = std::fs::read_to_string(format!("tests/fixtures/{}.txt", name)).unwrap();
        pdf::split_lines(&text)
    }

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn single_section_document() {
        let doc = lines(&["Seite 1", "Anschlussort", "Straße: Hauptstraße 1"]);
        let r = extract_requested_fields(&doc, &Config::default());
        assert_eq!(
            r.section("Anschlussort"),
            Some(
                &[ExtractedField {
                    label: "Straße".into(),
                    value: "Hauptstraße 1".into()
                }][..]
            )
        );
        assert_eq!(r.field_count(), 1);
    }

    #[test]
    fn sections_without_fields_are_absent() {
        let doc = lines(&["Stellvertreter", "nichts", "Anschlussort", "Straße: A 1"]);
        let r = extract_requested_fields(&doc, &Config::default());
        assert!(r.section("Stellvertreter").is_none());
        assert!(r.section("Anschlussnehmer").is_none());
        assert!(r.section("Anschlussort").is_some());
    }

    #[test]
    fn value_does_not_leak_across_sections() {
        // Firma belongs to Stellvertreter; a Firma line under Anschlussort is ignored.
        let doc = lines(&["Anschlussort", "Firma: Falsch", "Stellvertreter", "Straße: Falsch"]);
        let r = extract_requested_fields(&doc, &Config::default());
        assert!(r.is_empty());
    }

    #[test]
    fn name_comes_first_in_name_section() {
        let doc = lines(&[
            "Anschlussnehmer",
            "",
            "Herr Max Mustermann",
            "Geburtsdatum: 01.01.1990",
            "Anschrift: Weg 1, 12345 Ort",
        ]);
        let r = extract_requested_fields(&doc, &Config::default());
        let labels: Vec<&str> = r
            .section("Anschlussnehmer")
            .unwrap()
            .iter()
            .map(|f| f.label.as_str())
            .collect();
        assert_eq!(labels, vec!["Name", "Anschrift"]);
    }

    #[test]
    fn full_fixture() {
        let r = extract_requested_fields(&fixture_lines("anmeldung"), &Config::default());
        assert_eq!(r.value("Stellvertreter", "Firma"), Some("Sonnenstrom Montage GmbH"));
        assert_eq!(
            r.value("Stellvertreter", "Erreichbarkeit E-Mail"),
            Some("info@sonnenstrom-montage.de")
        );
        assert_eq!(r.value("Anschlussnehmer", "Name"), Some("Herr Max Mustermann"));
        assert_eq!(
            r.value("Anschlussnehmer", "Anschrift"),
            Some("Musterweg 12, 80331 München")
        );
        assert_eq!(r.value("Anschlussnehmer", "Erreichbarkeit Telefon"), Some("089 1234567"));
        assert_eq!(r.value("Anschlussort", "Straße"), Some("Lindenallee 7"));
        assert_eq!(
            r.value("Angaben zur Kundenanlage", "Mess- und Betriebskonzept"),
            Some("Überschusseinspeisung")
        );
        assert_eq!(
            r.value("Angaben zu den PV-Modulen", "Gesamtleistung aller PV-Module in kWp"),
            Some("9,84")
        );
        assert_eq!(
            r.value("Angaben zur Speichereinheit", "Bruttokapazität des Speichereinheit"),
            Some("10,24")
        );
    }

    struct OnePage(&'static str);

    impl TextSource for OnePage {
        fn page_texts(&self, _bytes: &[u8]) -> Result<Vec<String>, PdfError> {
            Ok(vec![self.0.to_string()])
        }
    }

    #[test]
    fn document_from_text_source() {
        let src = OnePage("  Anschlussort  \r\n  Straße: Hauptstraße 1  \r\n");
        let r = process_document(&src, b"", &Config::default()).unwrap();
        assert_eq!(r.value("Anschlussort", "Straße"), Some("Hauptstraße 1"));
    }

    #[test]
    fn fixture_without_storage() {
        let r = extract_requested_fields(&fixture_lines("ohne_speicher"), &Config::default());
        assert!(r.section("Angaben zur Speichereinheit").is_none());
        assert_eq!(r.value("Anschlussnehmer", "Name"), Some("Frau Erika Musterfrau"));
        assert!(r.section("Stellvertreter").is_none());
    }

    #[test]
    fn pdf_text_layer_to_report() {
        let bytes = pdf::text_pdf(&[
            "Stellvertreter",
            "Firma: Sonnenstrom Montage GmbH",
            "Anschlussnehmer",
            "Herr Max Mustermann",
            "Anschrift: Weg 1",
            "Erreichbarkeit Telefon: 089 1234567",
        ]);
        let config = Config::default();
        let r = process_document(&pdf::PdfTextExtractor, &bytes, &config).unwrap();
        assert_eq!(
            crate::report::format_as_txt(&r, &config),
            "Stellvertreter\n\
             - Firma: Sonnenstrom Montage GmbH\n\
             \n\
             Anschlussnehmer\n\
             - Name: Herr Max Mustermann\n\
             - Anschrift: Weg 1\n\
             - Erreichbarkeit Telefon: 089 1234567\n"
        );
    }
}
