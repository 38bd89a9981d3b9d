#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Validation and normalization of pack, level, and clip records.
//!
//! Every declarative record passes through this system before it can reach
//! the scheduler. Validation never coerces: a record is either accepted as-is
//! or rejected with the complete list of field-level problems.

use std::{
    collections::{HashMap, HashSet},
    fmt,
};

use chipnotes_core::{
    ClipMetadata, ClipSelection, LevelConfig, PackDefinition, PackId, PackModifiers, SpeciesCode,
    SpeciesEntry, SpeciesPool,
};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, info};

static IDENTIFIER_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9]*(_[a-z0-9]+)*$").expect("identifier pattern"));
static SPECIES_CODE_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]{4}$").expect("species code pattern"));

/// Inclusive range accepted for pack multipliers.
pub const MULTIPLIER_RANGE: (f64, f64) = (0.5, 2.0);
/// Allowed deviation of the vocalization weight sum from one.
pub const WEIGHT_SUM_TOLERANCE: f64 = 0.01;
/// Inclusive range accepted for clip quality scores.
pub const QUALITY_RANGE: (u8, u8) = (1, 5);

/// One problem found in a record, attributed to the offending field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldError {
    /// Path of the field, e.g. `species[2]`.
    pub field: String,
    /// Description of the problem.
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Outcome of validating a record: valid when no errors were collected.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationReport {
    errors: Vec<FieldError>,
}

impl ValidationReport {
    /// Reports whether the record passed every rule.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Problems collected in rule order.
    #[must_use]
    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    /// Consumes the report, yielding the collected problems.
    #[must_use]
    pub fn into_errors(self) -> Vec<FieldError> {
        self.errors
    }

    fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError {
            field: field.into(),
            message: message.into(),
        });
    }

    fn check_range(&mut self, field: &str, value: f64, (min, max): (f64, f64)) {
        if !value.is_finite() || value < min || value > max {
            self.push(field, format!("{value} is outside [{min}, {max}]"));
        }
    }
}

/// Configuration error raised when a record fails validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A pack definition was rejected.
    #[error("invalid pack `{pack_id}`: {}", join_errors(.errors))]
    InvalidPack {
        /// Identifier as supplied, possibly empty.
        pack_id: String,
        /// Field-level problems.
        errors: Vec<FieldError>,
    },
    /// A level configuration was rejected.
    #[error("invalid level {level}: {}", join_errors(.errors))]
    InvalidLevel {
        /// Level identifier as supplied.
        level: u32,
        /// Field-level problems.
        errors: Vec<FieldError>,
    },
    /// A clip set was rejected.
    #[error("invalid clip set: {}", join_errors(.errors))]
    InvalidClips {
        /// Field-level problems.
        errors: Vec<FieldError>,
    },
}

impl ValidationError {
    /// Field-level problems carried by the error.
    #[must_use]
    pub fn errors(&self) -> &[FieldError] {
        match self {
            Self::InvalidPack { errors, .. }
            | Self::InvalidLevel { errors, .. }
            | Self::InvalidClips { errors } => errors,
        }
    }
}

fn join_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Checks a pack definition against every pack rule.
#[must_use]
pub fn validate_pack(definition: &PackDefinition) -> ValidationReport {
    let mut report = ValidationReport::default();

    if definition.pack_id.is_empty() {
        report.push("pack_id", "must not be empty");
    } else if !IDENTIFIER_SHAPE.is_match(&definition.pack_id) {
        report.push(
            "pack_id",
            format!(
                "`{}` must be lowercase words joined by underscores",
                definition.pack_id
            ),
        );
    }

    if definition.species.is_empty() {
        report.push("species", "must list at least one species");
    }
    let mut seen = HashSet::new();
    for (index, code) in definition.species.iter().enumerate() {
        let field = format!("species[{index}]");
        if !SPECIES_CODE_SHAPE.is_match(code) {
            report.push(&field, format!("`{code}` is not a four-letter species code"));
        }
        if !seen.insert(code.as_str()) {
            report.push(&field, format!("duplicate species `{code}`"));
        }
    }

    if let Some(display) = &definition.display_species {
        for (index, code) in display.iter().enumerate() {
            if !seen.contains(code.as_str()) {
                report.push(
                    format!("display_species[{index}]"),
                    format!("`{code}` is not listed in species"),
                );
            }
        }
    }

    report.check_range(
        "overlap_multiplier",
        definition.overlap_multiplier,
        MULTIPLIER_RANGE,
    );
    report.check_range(
        "tempo_multiplier",
        definition.tempo_multiplier,
        MULTIPLIER_RANGE,
    );

    let weights = definition.vocalization_weights;
    report.check_range("vocalization_weights.song", weights.song, (0.0, 1.0));
    report.check_range("vocalization_weights.call", weights.call, (0.0, 1.0));
    let sum = weights.song + weights.call;
    if sum.is_finite() && (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        report.push(
            "vocalization_weights",
            format!("weights sum to {sum}, expected 1.0"),
        );
    }

    if let Some(tag) = &definition.seasonal_tag {
        if !IDENTIFIER_SHAPE.is_match(tag) {
            report.push(
                "seasonal_tag",
                format!("`{tag}` must be lowercase words joined by underscores"),
            );
        }
    }

    report
}

/// Checks a level configuration against every level rule.
#[must_use]
pub fn validate_level(config: &LevelConfig) -> ValidationReport {
    let mut report = ValidationReport::default();

    if !IDENTIFIER_SHAPE.is_match(config.pack_id.as_str()) {
        report.push(
            "pack_id",
            format!("`{}` is not a valid pack identifier", config.pack_id),
        );
    }
    if config.duration_ms == Some(0) {
        report.push("duration_ms", "must be positive");
    }
    if config.species_count == 0 {
        report.push("species_count", "must be at least 1");
    }
    report.check_range(
        "overlap_probability",
        config.overlap_probability,
        (0.0, 1.0),
    );
    if config.scoring_window_ms == 0 {
        report.push("scoring_window_ms", "must be positive");
    }
    if config.clip_selection == ClipSelection::Variations(0) {
        report.push("clip_selection", "variation count must be at least 1");
    }
    if let Some(filter) = &config.species_filter {
        if filter.is_empty() {
            report.push("species_filter", "must not be empty when present");
        }
        for (index, code) in filter.iter().enumerate() {
            if !SPECIES_CODE_SHAPE.is_match(code.as_str()) {
                report.push(
                    format!("species_filter[{index}]"),
                    format!("`{code}` is not a four-letter species code"),
                );
            }
        }
    }

    report
}

/// Checks a clip set: unique ids, sane durations and quality, and at most one
/// canonical clip per species among the non-rejected clips.
#[must_use]
pub fn validate_clips(clips: &[ClipMetadata]) -> ValidationReport {
    let mut report = ValidationReport::default();
    let mut ids = HashSet::new();
    let mut canonical: HashMap<&SpeciesCode, usize> = HashMap::new();

    for (index, clip) in clips.iter().enumerate() {
        let field = format!("clips[{index}]");
        if clip.clip_id.as_str().is_empty() {
            report.push(format!("{field}.clip_id"), "must not be empty");
        } else if !ids.insert(clip.clip_id.as_str()) {
            report.push(
                format!("{field}.clip_id"),
                format!("duplicate clip id `{}`", clip.clip_id),
            );
        }
        if !SPECIES_CODE_SHAPE.is_match(clip.species_code.as_str()) {
            report.push(
                format!("{field}.species_code"),
                format!("`{}` is not a four-letter species code", clip.species_code),
            );
        }
        if clip.duration_ms == 0 {
            report.push(format!("{field}.duration_ms"), "must be positive");
        }
        let (min_quality, max_quality) = QUALITY_RANGE;
        if clip.quality_score < min_quality || clip.quality_score > max_quality {
            report.push(
                format!("{field}.quality_score"),
                format!(
                    "{} is outside [{min_quality}, {max_quality}]",
                    clip.quality_score
                ),
            );
        }
        if clip.canonical && !clip.rejected {
            let count = canonical.entry(&clip.species_code).or_insert(0);
            *count += 1;
            if *count == 2 {
                report.push(
                    format!("{field}.canonical"),
                    format!("species `{}` has more than one canonical clip", clip.species_code),
                );
            }
        }
    }

    report
}

/// Validates a level, converting a failed report into a [`ValidationError`].
pub fn require_valid_level(config: &LevelConfig) -> Result<(), ValidationError> {
    let report = validate_level(config);
    if report.is_valid() {
        Ok(())
    } else {
        Err(ValidationError::InvalidLevel {
            level: config.level_id.get(),
            errors: report.into_errors(),
        })
    }
}

/// Validates a clip set, converting a failed report into a [`ValidationError`].
pub fn require_valid_clips(clips: &[ClipMetadata]) -> Result<(), ValidationError> {
    let report = validate_clips(clips);
    if report.is_valid() {
        Ok(())
    } else {
        Err(ValidationError::InvalidClips {
            errors: report.into_errors(),
        })
    }
}

/// Pack that passed validation. Only [`load_pack`] constructs one.
#[derive(Clone, Debug, PartialEq)]
pub struct Pack {
    id: PackId,
    display_name: String,
    species: Vec<SpeciesCode>,
    display_species: Vec<SpeciesCode>,
    modifiers: PackModifiers,
    seasonal_tag: Option<String>,
}

impl Pack {
    /// Pack identifier.
    #[must_use]
    pub fn id(&self) -> &PackId {
        &self.id
    }

    /// Name shown to players; falls back to the identifier.
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Species pool in declaration order.
    #[must_use]
    pub fn species(&self) -> &[SpeciesCode] {
        &self.species
    }

    /// Species shown on the pack card; the full pool when none were listed.
    #[must_use]
    pub fn display_species(&self) -> &[SpeciesCode] {
        &self.display_species
    }

    /// Multipliers applied at schedule time.
    #[must_use]
    pub const fn modifiers(&self) -> PackModifiers {
        self.modifiers
    }

    /// Seasonal marker, if any.
    #[must_use]
    pub fn seasonal_tag(&self) -> Option<&str> {
        self.seasonal_tag.as_deref()
    }

    /// Builds the scheduler's species pool from the supplied clip records.
    ///
    /// Clips keep their input order per species so that "first `n` clips"
    /// selections are stable. Rejected clips and clips of species outside the
    /// pack are dropped.
    #[must_use]
    pub fn species_pool(&self, clips: &[ClipMetadata]) -> SpeciesPool {
        let entries = self
            .species
            .iter()
            .map(|code| {
                let species_clips: Vec<ClipMetadata> = clips
                    .iter()
                    .filter(|clip| &clip.species_code == code && !clip.rejected)
                    .cloned()
                    .collect();
                let display_name = species_clips
                    .iter()
                    .find_map(|clip| clip.common_name.clone())
                    .unwrap_or_else(|| code.to_string());
                SpeciesEntry {
                    code: code.clone(),
                    display_name,
                    clips: species_clips,
                }
            })
            .collect();
        SpeciesPool {
            modifiers: self.modifiers,
            entries,
        }
    }
}

/// Validates a pack definition and converts it into a [`Pack`].
pub fn load_pack(definition: &PackDefinition) -> Result<Pack, ValidationError> {
    let report = validate_pack(definition);
    if !report.is_valid() {
        debug!(
            pack_id = %definition.pack_id,
            errors = report.errors().len(),
            "pack_rejected"
        );
        return Err(ValidationError::InvalidPack {
            pack_id: definition.pack_id.clone(),
            errors: report.into_errors(),
        });
    }

    let species: Vec<SpeciesCode> = definition
        .species
        .iter()
        .map(|code| SpeciesCode::new(code.as_str()))
        .collect();
    let display_species = match &definition.display_species {
        Some(display) => display
            .iter()
            .map(|code| SpeciesCode::new(code.as_str()))
            .collect(),
        None => species.clone(),
    };

    Ok(Pack {
        id: PackId::new(definition.pack_id.as_str()),
        display_name: definition
            .display_name
            .clone()
            .unwrap_or_else(|| definition.pack_id.clone()),
        species,
        display_species,
        modifiers: PackModifiers {
            overlap_multiplier: definition.overlap_multiplier,
            tempo_multiplier: definition.tempo_multiplier,
            vocalization_weights: definition.vocalization_weights,
        },
        seasonal_tag: definition.seasonal_tag.clone(),
    })
}

/// Cache of loaded packs keyed by identifier.
#[derive(Debug, Default)]
pub struct PackRegistry {
    packs: HashMap<PackId, Pack>,
}

impl PackRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and caches a pack, replacing any pack with the same id.
    pub fn load(&mut self, definition: &PackDefinition) -> Result<&Pack, ValidationError> {
        let pack = load_pack(definition)?;
        let id = pack.id().clone();
        info!(
            pack_id = %id,
            species = pack.species().len(),
            "pack_loaded"
        );
        if self.packs.insert(id.clone(), pack).is_some() {
            debug!(pack_id = %id, "pack_replaced");
        }
        Ok(&self.packs[&id])
    }

    /// Looks up a cached pack.
    #[must_use]
    pub fn get(&self, id: &PackId) -> Option<&Pack> {
        self.packs.get(id)
    }

    /// Modifiers of a cached pack.
    #[must_use]
    pub fn modifiers(&self, id: &PackId) -> Option<PackModifiers> {
        self.packs.get(id).map(Pack::modifiers)
    }

    /// Number of cached packs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.packs.len()
    }

    /// Reports whether no pack has been loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.packs.is_empty()
    }
}
