/*!
 * Attribute cleaning operations.
 *
 * Column-level cleaning removes fields that carry no data; value-level
 * cleaning normalises null markers and rewrites values through lookups,
 * regex substitution, literal replacement or zero padding. Value changes go
 * through a single `EditSession`, so a failing operation leaves the layer as
 * it was.
 */

use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use crate::errors::{CleaningError, LayerError};
use crate::layer::{AttributeValue, EditSession, FeatureFilter, Field, LayerStore};

static DIGIT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("valid digit pattern"));

/// Default length for zero padding
pub const DEFAULT_PAD_LENGTH: usize = 3;

/// Tokens treated as null by `clean_null_values` when none are given
pub const DEFAULT_NULL_TOKENS: &[&str] = &["null", "none", "nan", "n/a"];

fn matches_token(value: &AttributeValue, tokens: &[&str]) -> bool {
    match value {
        AttributeValue::Text(s) => {
            let s = s.trim();
            tokens.iter().any(|t| t.trim().eq_ignore_ascii_case(s))
        }
        _ => false,
    }
}

fn is_null_like(value: &AttributeValue, null_token: Option<&str>) -> bool {
    value.is_null_or_blank() || null_token.is_some_and(|t| matches_token(value, &[t]))
}

/// Delete every field whose values are all null or blank.
/// Returns the removed field names.
pub fn remove_empty_columns<S: LayerStore + ?Sized>(store: &mut S) -> Result<Vec<String>, LayerError> {
    info!("Checking for empty columns in layer {}", store.name());

    let features = store.get_features(&FeatureFilter::All);
    let empty: Vec<String> = store
        .fields()
        .into_iter()
        .map(|f| f.name)
        .filter(|name| features.iter().all(|f| f.get(name).is_null_or_blank()))
        .collect();

    for name in &empty {
        store.delete_field(name)?;
    }

    if empty.is_empty() {
        info!("No empty columns found");
    } else {
        info!("Removed empty columns: {:?}", empty);
    }
    Ok(empty)
}

/// Share of null values in a field, in percent
pub fn null_percentage<S: LayerStore + ?Sized>(
    store: &S,
    field: &str,
    null_token: Option<&str>,
) -> Result<f64, LayerError> {
    if store.field(field).is_none() {
        return Err(LayerError::FieldNotFound(field.to_string()));
    }
    let features = store.get_features(&FeatureFilter::All);
    if features.is_empty() {
        return Ok(0.0);
    }
    let nulls = features
        .iter()
        .filter(|f| is_null_like(f.get(field), null_token))
        .count();
    Ok(nulls as f64 / features.len() as f64 * 100.0)
}

/// Delete every field whose null share is at least `threshold` percent.
/// `null_token` additionally counts one marker string (e.g. "NULL") as null.
pub fn remove_columns_with_null_percentage<S: LayerStore + ?Sized>(
    store: &mut S,
    threshold: f64,
    null_token: Option<&str>,
) -> Result<Vec<String>, CleaningError> {
    if !(0.0..=100.0).contains(&threshold) {
        return Err(CleaningError::InvalidOption(format!(
            "threshold must be between 0 and 100, got {}",
            threshold
        )));
    }
    if store.feature_count() == 0 {
        info!("Layer {} has no features, nothing to remove", store.name());
        return Ok(Vec::new());
    }

    let mut removed = Vec::new();
    for field in store.fields() {
        let share = null_percentage(&*store, &field.name, null_token)?;
        if share >= threshold {
            store.delete_field(&field.name)?;
            info!("Removed field {} with {:.1}% null values", field.name, share);
            removed.push(field.name);
        } else {
            debug!(
                "Field {} has {:.1}% null values (below threshold of {}%)",
                field.name, share, threshold
            );
        }
    }
    Ok(removed)
}

/// Rewrite values matching any of `tokens` (trimmed, case-insensitive) to
/// `replacement`. Returns the number of changed values.
pub fn clean_null_values<S: LayerStore + ?Sized>(
    store: &mut S,
    field: &str,
    tokens: &[&str],
    replacement: AttributeValue,
) -> Result<usize, CleaningError> {
    if store.field(field).is_none() {
        return Err(LayerError::FieldNotFound(field.to_string()).into());
    }
    let tokens = if tokens.is_empty() { DEFAULT_NULL_TOKENS } else { tokens };

    let targets: Vec<_> = store
        .get_features(&FeatureFilter::All)
        .into_iter()
        .filter(|f| matches_token(f.get(field), tokens) && *f.get(field) != replacement)
        .map(|f| f.id)
        .collect();
    if targets.is_empty() {
        info!("No null markers found in field {}", field);
        return Ok(0);
    }

    let mut session = EditSession::begin(store)?;
    for id in &targets {
        session.set(*id, field, replacement.clone())?;
    }
    let changed = session.commit()?;
    info!("Cleaned {} null markers in field {}", changed, field);
    Ok(changed)
}

/// How `find_and_replace` computes new values
#[derive(Debug, Clone, PartialEq)]
pub enum ReplaceMode {
    /// Look values up in a reference layer, `find_field` → `replace_field`.
    /// With a `pattern`, values matching it are looked up by their first
    /// digit run.
    Lookup {
        find_field: String,
        replace_field: String,
        pattern: Option<String>,
    },
    /// Regex substitution
    Regex { pattern: String, replacement: String },
    /// Exact match replacement
    Literal { find: String, replace: String },
    /// Left-pad integer values with zeros
    PadZeros { length: usize },
}

/// Options for `find_and_replace`
#[derive(Debug, Clone)]
pub struct FindReplaceOptions {
    /// Field to read values from
    pub field: String,
    pub mode: ReplaceMode,
    /// Strip leading zeros on both sides of a lookup
    pub strip_zeros: bool,
    /// Write into a new string column instead of `field`; an empty name
    /// means `{field}_new`
    pub new_column: Option<String>,
}

impl FindReplaceOptions {
    pub fn new(field: impl Into<String>, mode: ReplaceMode) -> Self {
        Self {
            field: field.into(),
            mode,
            strip_zeros: false,
            new_column: None,
        }
    }

    pub fn strip_zeros(mut self, strip: bool) -> Self {
        self.strip_zeros = strip;
        self
    }

    pub fn new_column(mut self, name: Option<String>) -> Self {
        self.new_column = name;
        self
    }

    /// Name of the column receiving new values
    pub fn output_field(&self) -> String {
        match self.new_column.as_deref().map(str::trim) {
            Some("") => format!("{}_new", self.field),
            Some(name) => name.to_string(),
            None => self.field.clone(),
        }
    }
}

/// Counts from a `find_and_replace` run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindReplaceReport {
    /// Field that received the values
    pub target_field: String,
    /// Non-null values examined
    pub examined: usize,
    /// Values rewritten
    pub replaced: usize,
    /// Values with no replacement
    pub unmatched: usize,
}

fn strip_leading_zeros(value: &str, strip: bool) -> &str {
    if strip { value.trim_start_matches('0') } else { value }
}

/// Compiled form of a `ReplaceMode`
enum Replacer {
    Lookup {
        table: HashMap<String, String>,
        pattern: Option<Regex>,
        strip_zeros: bool,
    },
    Regex { pattern: Regex, replacement: String },
    Literal { find: String, replace: String },
    PadZeros { length: usize },
}

impl Replacer {
    fn build(
        options: &FindReplaceOptions,
        reference: Option<&dyn LayerStore>,
    ) -> Result<Self, CleaningError> {
        let replacer = match &options.mode {
            ReplaceMode::Lookup { find_field, replace_field, pattern } => {
                let reference = reference.ok_or_else(|| {
                    CleaningError::InvalidOption("lookup mode needs a reference layer".to_string())
                })?;
                for name in [find_field, replace_field] {
                    if reference.field(name).is_none() {
                        return Err(LayerError::FieldNotFound(name.clone()).into());
                    }
                }
                let mut table = HashMap::new();
                for feature in reference.get_features(&FeatureFilter::All) {
                    let (Some(find), Some(replace)) =
                        (feature.get(find_field).as_text(), feature.get(replace_field).as_text())
                    else {
                        continue;
                    };
                    table.insert(
                        strip_leading_zeros(find.trim(), options.strip_zeros).to_string(),
                        replace,
                    );
                }
                info!("Lookup table created with {} entries", table.len());
                let pattern = pattern
                    .as_deref()
                    .filter(|p| !p.is_empty())
                    .map(Regex::new)
                    .transpose()?;
                Self::Lookup { table, pattern, strip_zeros: options.strip_zeros }
            }
            ReplaceMode::Regex { pattern, replacement } => Self::Regex {
                pattern: Regex::new(pattern)?,
                replacement: replacement.clone(),
            },
            ReplaceMode::Literal { find, replace } => Self::Literal {
                find: find.clone(),
                replace: replace.clone(),
            },
            ReplaceMode::PadZeros { length } => {
                if *length == 0 {
                    return Err(CleaningError::InvalidOption(
                        "pad length must be at least 1".to_string(),
                    ));
                }
                Self::PadZeros { length: *length }
            }
        };
        Ok(replacer)
    }

    fn replace(&self, value: &str) -> Option<String> {
        match self {
            Self::Lookup { table, pattern, strip_zeros } => {
                let key = match pattern {
                    Some(pattern) => {
                        if !pattern.is_match(value) {
                            return None;
                        }
                        DIGIT_RUN.find(value)?.as_str()
                    }
                    None => value.trim(),
                };
                let key = strip_leading_zeros(key, *strip_zeros);
                let found = table.get(key).cloned();
                match &found {
                    Some(new_value) => debug!("Matched: {} -> {} -> {}", value, key, new_value),
                    None => debug!("No match found for: {} -> {}", value, key),
                }
                found
            }
            Self::Regex { pattern, replacement } => pattern
                .is_match(value)
                .then(|| pattern.replace_all(value, replacement.as_str()).into_owned()),
            Self::Literal { find, replace } => (value == find).then(|| replace.clone()),
            Self::PadZeros { length } => value
                .trim()
                .parse::<i64>()
                .ok()
                .map(|n| format!("{:0width$}", n, width = *length)),
        }
    }
}

/// Rewrite the values of `options.field`.
///
/// All writes happen in one edit session. When `new_column` is set the
/// column is created first and removed again if the session fails.
pub fn find_and_replace<S: LayerStore + ?Sized>(
    store: &mut S,
    options: &FindReplaceOptions,
    reference: Option<&dyn LayerStore>,
) -> Result<FindReplaceReport, CleaningError> {
    if store.field(&options.field).is_none() {
        return Err(LayerError::FieldNotFound(options.field.clone()).into());
    }
    let replacer = Replacer::build(options, reference)?;

    let target_field = options.output_field();
    let creates_column = target_field != options.field;
    if creates_column {
        if store.field(&target_field).is_some() {
            return Err(LayerError::FieldExists(target_field).into());
        }
        store.add_field(Field::string(target_field.as_str()))?;
        info!("Created column {}", target_field);
    }

    let result = apply_replacements(store, &options.field, &target_field, &replacer);
    match result {
        Ok(report) => {
            info!(
                "Replaced {} values out of {} features",
                report.replaced,
                store.feature_count()
            );
            Ok(report)
        }
        Err(e) => {
            if creates_column {
                if let Err(cleanup) = store.delete_field(&target_field) {
                    warn!("Could not remove column {}: {}", target_field, cleanup);
                }
            }
            Err(e)
        }
    }
}

fn apply_replacements<S: LayerStore + ?Sized>(
    store: &mut S,
    source_field: &str,
    target_field: &str,
    replacer: &Replacer,
) -> Result<FindReplaceReport, CleaningError> {
    let mut report = FindReplaceReport {
        target_field: target_field.to_string(),
        ..Default::default()
    };
    let features = store.get_features(&FeatureFilter::All);

    let mut session = EditSession::begin(store)?;
    for feature in features {
        let Some(value) = feature.get(source_field).as_text() else {
            continue;
        };
        report.examined += 1;
        match replacer.replace(&value) {
            Some(new_value) if new_value != value => {
                session.set(feature.id, target_field, new_value)?;
                report.replaced += 1;
            }
            Some(_) => {}
            None => report.unmatched += 1,
        }
    }
    session.commit()?;
    Ok(report)
}
