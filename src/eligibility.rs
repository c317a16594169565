//! # Eligibility Gate
//!
//! Decides whether a source image, and a sprite within it, should ever be
//! resampled.
//!
//! Image-level checks (format, size, render target, mip levels, name
//! patterns, text handling) depend only on the image and the configuration,
//! so their verdict is memoised on the image and recomputed when the
//! configuration generation changes. Bounds checks are cheap and run on every
//! call.
//!
//! The first rejection of an image for a given reason is logged once at
//! `info`; repeats are silent.

use std::sync::Arc;

use parking_lot::Mutex;
use regex::{Regex, RegexBuilder};

use crate::cache::key::SpriteClass;
use crate::config::EngineConfig;
use crate::core::geometry::Bounds;
use crate::error::{ResampleError, ResampleResult};
use crate::source::{SourceImage, normalize_name};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum IneligibleReason {
    Disabled,
    RenderTarget,
    TooSmall,
    ZeroArea,
    Disposed,
    MultiLevel,
    UnsupportedFormat,
    LargeText,
    SmallText,
    Blacklisted(String),
    SpritesDisabled,
    DegenerateBounds,
    OutOfBounds,
}

impl std::fmt::Display for IneligibleReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IneligibleReason::Disabled => write!(f, "resampling is disabled"),
            IneligibleReason::RenderTarget => write!(f, "image is a render target"),
            IneligibleReason::TooSmall => write!(f, "image is below the minimum dimension"),
            IneligibleReason::ZeroArea => write!(f, "image has zero area"),
            IneligibleReason::Disposed => write!(f, "image is disposed"),
            IneligibleReason::MultiLevel => write!(f, "image has multiple mip levels"),
            IneligibleReason::UnsupportedFormat => write!(f, "pixel format is not supported"),
            IneligibleReason::LargeText => write!(f, "large text resampling is disabled"),
            IneligibleReason::SmallText => write!(f, "small text resampling is disabled"),
            IneligibleReason::Blacklisted(pattern) => write!(f, "name matches blacklist pattern '{}'", pattern),
            IneligibleReason::SpritesDisabled => write!(f, "sprite resampling is disabled"),
            IneligibleReason::DegenerateBounds => write!(f, "sprite bounds are empty"),
            IneligibleReason::OutOfBounds => write!(f, "sprite bounds exceed the image"),
        }
    }
}

/// A name pattern from `resample.blacklist` or `resample.sliced`, compiled once.
///
/// - `@regex`: a case-insensitive regex searched in the name. `\\` stands
///   for a path separator, so patterns written for `Maps\\Town` still work.
/// - an entry containing `*` or `?`: a glob that must match the whole name.
/// - anything else: a name prefix.
#[derive(Debug, Clone)]
pub struct NamePattern {
    source: String,
    regex: Regex,
}

impl NamePattern {
    pub fn compile(pattern: &str) -> Result<Self, regex::Error> {
        let expression = match pattern.strip_prefix('@') {
            Some(raw) => raw.replace(r"\\", "/"),
            None if pattern.contains(['*', '?']) => {
                let glob = regex::escape(&normalize_name(pattern))
                    .replace(r"\*", ".*")
                    .replace(r"\?", ".");
                format!("^{}$", glob)
            }
            None => format!("^{}", regex::escape(&normalize_name(pattern))),
        };
        let regex = RegexBuilder::new(&expression).case_insensitive(true).build()?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    /// The pattern as written in the configuration.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// `name` must already be normalised.
    pub fn is_match(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }
}

/// A list of [`NamePattern`]s.
#[derive(Debug, Clone, Default)]
pub struct NamePatterns {
    patterns: Vec<NamePattern>,
}

impl NamePatterns {
    /// Compile every entry, failing on the first invalid one.
    pub fn compile(field: &str, patterns: &[String]) -> ResampleResult<Self> {
        let patterns = patterns
            .iter()
            .map(|p| NamePattern::compile(p).map_err(|e| ResampleError::config(field, p.as_str(), e.to_string())))
            .collect::<ResampleResult<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Compile what compiles; invalid entries are logged and skipped.
    fn compile_lenient(field: &str, patterns: &[String]) -> Self {
        let patterns = patterns
            .iter()
            .filter_map(|p| match NamePattern::compile(p) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    log::warn!("ignoring {} entry '{}': {}", field, p, e);
                    None
                }
            })
            .collect();
        Self { patterns }
    }

    pub fn find(&self, name: &str) -> Option<&NamePattern> {
        self.patterns.iter().find(|p| p.is_match(name))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Patterns of one configuration generation.
#[derive(Debug)]
struct CompiledPatterns {
    generation: u64,
    blacklist: NamePatterns,
    sliced: NamePatterns,
}

#[derive(Debug, Default)]
pub struct EligibilityGate {
    patterns: Mutex<Option<Arc<CompiledPatterns>>>,
}

impl EligibilityGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn patterns(&self, config: &EngineConfig, generation: u64) -> Arc<CompiledPatterns> {
        let mut cached = self.patterns.lock();
        if let Some(patterns) = cached.as_ref().filter(|p| p.generation == generation) {
            return patterns.clone();
        }
        let patterns = Arc::new(CompiledPatterns {
            generation,
            blacklist: NamePatterns::compile_lenient("resample.blacklist", &config.resample.blacklist),
            sliced: NamePatterns::compile_lenient("resample.sliced", &config.resample.sliced),
        });
        log::debug!(
            "compiled {} blacklist and {} sliced patterns for generation {}",
            patterns.blacklist.len(),
            patterns.sliced.len(),
            generation
        );
        *cached = Some(patterns.clone());
        patterns
    }

    /// Boolean form of [`EligibilityGate::check`].
    pub fn is_eligible(&self, source: &SourceImage, bounds: Bounds, config: &EngineConfig, generation: u64) -> bool {
        self.check(source, bounds, config, generation).is_ok()
    }

    /// Classify the sprite, or say why it must not be resampled.
    pub fn check(
        &self,
        source: &SourceImage,
        bounds: Bounds,
        config: &EngineConfig,
        generation: u64,
    ) -> Result<SpriteClass, IneligibleReason> {
        let result = self.check_image(source, config, generation).and_then(|()| {
            if bounds.is_degenerate() {
                return Err(IneligibleReason::DegenerateBounds);
            }
            if !bounds.fits_within(source.width(), source.height()) {
                return Err(IneligibleReason::OutOfBounds);
            }
            let class = self.classify(source, bounds, config, generation);
            if class == SpriteClass::Sprite && !config.resample.resample_sprites {
                return Err(IneligibleReason::SpritesDisabled);
            }
            Ok(class)
        });

        if let Err(reason) = &result {
            if source.first_report(reason) {
                let error = ResampleError::ineligible(reason.clone());
                log::info!("not resampling '{}' {}: {}", source.display_name(), bounds, error);
            }
        }
        result
    }

    pub fn classify(&self, source: &SourceImage, bounds: Bounds, config: &EngineConfig, generation: u64) -> SpriteClass {
        if let Some(name) = source.normalized_name() {
            if self.patterns(config, generation).sliced.find(name).is_some() {
                return SpriteClass::SlicedImage;
            }
        }
        if bounds == source.full_bounds() {
            SpriteClass::Image
        } else {
            SpriteClass::Sprite
        }
    }

    fn check_image(&self, source: &SourceImage, config: &EngineConfig, generation: u64) -> Result<(), IneligibleReason> {
        if source.is_disposed() {
            return Err(IneligibleReason::Disposed);
        }
        if let Some(verdict) = source.cached_verdict(generation) {
            return verdict;
        }
        let patterns = self.patterns(config, generation);
        let verdict = Self::evaluate_image(source, config, &patterns.blacklist);
        source.store_verdict(generation, verdict.clone());
        verdict
    }

    fn evaluate_image(
        source: &SourceImage,
        config: &EngineConfig,
        blacklist: &NamePatterns,
    ) -> Result<(), IneligibleReason> {
        let r = &config.resample;
        if !config.enabled || !r.enabled {
            return Err(IneligibleReason::Disabled);
        }
        if source.is_render_target() {
            return Err(IneligibleReason::RenderTarget);
        }
        if source.width() == 0 || source.height() == 0 {
            return Err(IneligibleReason::ZeroArea);
        }
        if source.width() < r.minimum_texture_dimension || source.height() < r.minimum_texture_dimension {
            return Err(IneligibleReason::TooSmall);
        }
        if source.levels() > 1 {
            return Err(IneligibleReason::MultiLevel);
        }
        if !r.supported_formats.contains(&source.format()) {
            return Err(IneligibleReason::UnsupportedFormat);
        }
        if source.format().is_font_format() {
            let large = source.normalized_name().is_some_and(|n| n.starts_with("fonts/"));
            if large && !r.resample_large_text {
                return Err(IneligibleReason::LargeText);
            }
            if !large && !r.resample_small_text {
                return Err(IneligibleReason::SmallText);
            }
        }
        if let Some(name) = source.normalized_name() {
            if let Some(pattern) = blacklist.find(name) {
                return Err(IneligibleReason::Blacklisted(pattern.as_str().to_string()));
            }
        }
        Ok(())
    }
}
