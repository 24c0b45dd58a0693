use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Everything the pipeline needs to know about the document template.
///
/// Built once (from the defaults or a JSON file) and passed by reference into
/// every stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Known section titles, in report order.
    pub headers: Vec<String>,
    /// Section title → labels expected as `label: value` inside that section.
    pub targets: BTreeMap<String, Vec<String>>,
    /// Section whose first bare line is the addressee's name.
    pub name_section: String,
    /// Lines starting with one of these (case-insensitive) are never a name.
    pub name_skip_prefixes: Vec<String>,
    pub form: FormConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FormConfig {
    pub projection: Vec<ProjectionRule>,
    pub text_fields: Vec<TextBinding>,
    pub checkboxes: Vec<CheckboxRule>,
    /// Text field stamped with today's date, if any.
    pub date_field: Option<String>,
    pub timezone: Tz,
    pub date_format: String,
}

/// Maps one extracted `(section, label)` pair onto a projection key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionRule {
    pub section: String,
    pub label: String,
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextBinding {
    pub key: String,
    pub field: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckboxRule {
    pub field: String,
    pub when: CheckWhen,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckWhen {
    Always,
    /// Checked iff the projection value for this key is non-empty.
    NonEmpty(String),
}

pub const NAME_LABEL: &str = "Name";

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        Ok(config)
    }

    pub fn labels_for(&self, header: &str) -> &[String] {
        self.targets.get(header).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_header(&self, line: &str) -> bool {
        self.headers.iter().any(|h| h == line)
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for Config {
    fn default() -> Self {
        let targets: [(&str, &[&str]); 6] = [
            ("Stellvertreter", &["Firma", "Erreichbarkeit E-Mail"]),
            ("Anschlussnehmer", &["Anschrift", "Erreichbarkeit Telefon"]),
            ("Anschlussort", &["Straße"]),
            ("Angaben zur Kundenanlage", &["Mess- und Betriebskonzept"]),
            ("Angaben zu den PV-Modulen", &["Gesamtleistung aller PV-Module in kWp"]),
            ("Angaben zur Speichereinheit", &["Bruttokapazität des Speichereinheit"]),
        ];
        let targets = targets
            .into_iter()
            .map(|(h, labels)| (h.to_string(), strings(labels)))
            .collect();

        Self {
            headers: strings(&[
                "Stellvertreter",
                "Anschlussnehmer",
                "Anschlussort",
                "Angaben zur Kundenanlage",
                "Angaben zu den PV-Modulen",
                "Angaben zur Speichereinheit",
            ]),
            targets,
            name_section: "Anschlussnehmer".into(),
            name_skip_prefixes: strings(&["Geburtsdatum"]),
            form: FormConfig::default(),
        }
    }
}

impl Default for FormConfig {
    fn default() -> Self {
        let rule = |section: &str, label: &str, key: &str| ProjectionRule {
            section: section.into(),
            label: label.into(),
            key: key.into(),
        };
        let bind = |key: &str, field: &str| TextBinding {
            key: key.into(),
            field: field.into(),
        };

        Self {
            projection: vec![
                rule("Anschlussnehmer", NAME_LABEL, "name"),
                rule("Anschlussnehmer", "Anschrift", "anschrift"),
                rule("Anschlussnehmer", "Erreichbarkeit Telefon", "telefon"),
                rule("Anschlussort", "Straße", "anschlussort"),
                rule("Angaben zur Kundenanlage", "Mess- und Betriebskonzept", "messkonzept"),
                rule("Angaben zu den PV-Modulen", "Gesamtleistung aller PV-Module in kWp", "pv_kwp"),
                rule("Angaben zur Speichereinheit", "Bruttokapazität des Speichereinheit", "speicher_kwh"),
            ],
            text_fields: vec![
                bind("name", "Name"),
                bind("anschrift", "Anschrift"),
                bind("telefon", "Telefon"),
                bind("anschlussort", "Anschlussort"),
                bind("messkonzept", "Messkonzept"),
                bind("pv_kwp", "PV_Leistung_kWp"),
                bind("speicher_kwh", "Speicher_kWh"),
            ],
            checkboxes: vec![
                CheckboxRule {
                    field: "PV_Anlage".into(),
                    when: CheckWhen::Always,
                },
                CheckboxRule {
                    field: "Speicher_vorhanden".into(),
                    when: CheckWhen::NonEmpty("speicher_kwh".into()),
                },
            ],
            date_field: Some("Datum".into()),
            timezone: chrono_tz::Europe::Berlin,
            date_format: "%d.%m.%Y".into(),
        }
    }
}
