use std::borrow::Cow;
use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// A single spreadsheet cell as handed over by the ingestion layer.
///
/// Deserializes from JSON strings, numbers and `null`. Dates only appear when
/// the caller builds rows in code; textual dates stay `Text` until parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Null,
    Number(f64),
    Text(String),
    Date(NaiveDateTime),
}

impl RawValue {
    pub fn is_null(&self) -> bool {
        matches!(self, RawValue::Null)
    }

    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            RawValue::Null => None,
            RawValue::Text(value) => Some(Cow::Borrowed(value.as_str())),
            RawValue::Number(value) => Some(Cow::Owned(value.to_string())),
            RawValue::Date(value) => {
                Some(Cow::Owned(value.format("%Y-%m-%dT%H:%M:%S").to_string()))
            }
        }
    }

    /// Mirrors spreadsheet truthiness: null, empty text, zero and NaN are blank.
    pub fn is_blank(&self) -> bool {
        match self {
            RawValue::Null => true,
            RawValue::Text(value) => value.is_empty(),
            RawValue::Number(value) => *value == 0.0 || value.is_nan(),
            RawValue::Date(_) => false,
        }
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        RawValue::Text(value)
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Number(value)
    }
}

impl From<i64> for RawValue {
    fn from(value: i64) -> Self {
        RawValue::Number(value as f64)
    }
}

impl From<NaiveDateTime> for RawValue {
    fn from(value: NaiveDateTime) -> Self {
        RawValue::Date(value)
    }
}

impl From<NaiveDate> for RawValue {
    fn from(value: NaiveDate) -> Self {
        RawValue::Date(value.and_time(chrono::NaiveTime::MIN))
    }
}

/// One loosely-typed spreadsheet row keyed by canonical field name.
///
/// No field is guaranteed to exist; every accessor treats a missing key the
/// same as an explicit `Null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(BTreeMap<String, RawValue>);

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: &str, value: impl Into<RawValue>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: &str, value: impl Into<RawValue>) {
        self.0.insert(field.to_string(), value.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The cell for `field`, skipping explicit nulls.
    pub fn get(&self, field: &str) -> Option<&RawValue> {
        self.0.get(field).filter(|value| !value.is_null())
    }

    /// First non-null cell among `fields`, in order.
    pub fn first_present(&self, fields: &[&str]) -> Option<&RawValue> {
        fields.iter().find_map(|field| self.get(field))
    }

    /// First non-blank cell among `fields`, in order.
    pub fn first_filled(&self, fields: &[&str]) -> Option<&RawValue> {
        fields
            .iter()
            .find_map(|field| self.get(field).filter(|value| !value.is_blank()))
    }
}

impl<K: Into<String>, V: Into<RawValue>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Row(iter
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect())
    }
}

/// Canonical field names produced by the column-alias layer.
pub mod fields {
    pub mod contract {
        pub const START_DATE: &str = "DataInicio";
        pub const ACTIVATION_DATE: &str = "DataAtivacao";
        pub const INCLUSION_DATE: &str = "DataInclusao";
        pub const RESCISSION_DATE: &str = "DataRescisao";
        pub const RENT_VALUE: &str = "ValorAluguel";
        pub const GUARANTEE_VALUE: &str = "ValorGarantia";
        pub const GUARANTEE_FORM: &str = "FormaGarantia";
        pub const GUARANTEE_KIND: &str = "TipoGarantia";
        pub const STATUS: &str = "Situacao";
        pub const STATUS_ALT: &str = "Status";

        pub const START_DATES: &[&str] = &[START_DATE, ACTIVATION_DATE, INCLUSION_DATE];
        pub const GUARANTEES: &[&str] = &[GUARANTEE_FORM, GUARANTEE_KIND];
        pub const STATUSES: &[&str] = &[STATUS, STATUS_ALT];
    }

    pub mod engagement {
        pub const INCLUDED_AT: &str = "DataHoraInclusao";
        pub const LAST_INTERACTION_AT: &str = "DataHoraUltimaInteracao";
        pub const PHASE: &str = "Fase";
        pub const TEMPERATURE: &str = "Termometro";
        pub const QUALIFICATION: &str = "Mql";
        pub const STATUS: &str = "Situacao";
        pub const LAST_INTERACTION: &str = "UltimaInteracao";
        pub const DISCARD_REASON: &str = "SituacaoDescarte";
        pub const MEDIA: &str = "Midia";
        pub const REFERRAL: &str = "Indicacao";
        pub const BROKER: &str = "Corretor";
        pub const PURPOSE: &str = "Finalidade";
        pub const CART_PROPERTIES: &str = "ImoveisCarrinho";
        pub const VISIT_PROPERTIES: &str = "ImoveisVisita";
        pub const PROPOSAL_PROPERTIES: &str = "ImoveisProposta";

        pub const DATES: &[&str] = &[INCLUDED_AT, LAST_INTERACTION_AT];
        pub const SOURCES: &[&str] = &[MEDIA, REFERRAL];
        pub const DISCARD_DETAILS: &[&str] = &[DISCARD_REASON, LAST_INTERACTION];
    }

    pub mod property {
        pub const REGISTERED_AT: &str = "DataCadastro";
        pub const INCLUSION_DATE: &str = "DataInclusao";
        pub const UPDATED_AT: &str = "DataAtualizacao";
        pub const VALUE: &str = "Valor";
        pub const DESTINATION: &str = "Destinacao";
        pub const SCORE: &str = "Pontuacao";

        pub const DATES: &[&str] = &[REGISTERED_AT, INCLUSION_DATE, UPDATED_AT];
        pub const STATUSES: &[&str] = &[
            "Situacao",
            "Situação",
            "Status",
            "SituacaoImovel",
            "SituacaoImóvel",
            "StatusImovel",
            "StatusImóvel",
        ];
    }
}

/// One time slot of a series. `value` starts at `T::default()`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bucket<T> {
    pub key: String,
    pub period_start: NaiveDate,
    pub label: String,
    pub value: T,
}
