use std::fmt;
use std::path::Path;

/// One row of the effect policy: a half-open volume range and the effect the
/// presentation layer should apply when a small-change trigger lands in it.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyBand {
    pub range_low: f32,
    pub range_high: f32,
    pub effect_id: String,
}

/// Volume-range to effect lookup table.
///
/// This replaces the hand-written if/else ladders over `vol` that live
/// performance patches accumulate: the ladder becomes data, loadable per set.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectPolicy {
    bands: Vec<PolicyBand>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PolicyError {
    Io(String),
    Parse { line: usize, message: String },
    EmptyTable,
    InvalidRange { effect: String, low: f32, high: f32 },
}

impl fmt::Display for PolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "I/O error: {msg}"),
            Self::Parse { line, message } => write!(f, "parse error at line {line}: {message}"),
            Self::EmptyTable => write!(f, "effect policy must contain at least one band"),
            Self::InvalidRange { effect, low, high } => {
                write!(f, "invalid range for effect '{effect}': low={low} high={high}")
            }
        }
    }
}

impl std::error::Error for PolicyError {}

impl EffectPolicy {
    /// Parses the line-based table format:
    /// `band <low> <high> <effect-id>`, `#` comments and blank lines ignored.
    pub fn parse(text: &str) -> Result<Self, PolicyError> {
        let mut bands = Vec::new();

        for (line_idx, raw) in text.lines().enumerate() {
            let line_no = line_idx + 1;
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let tokens: Vec<&str> = trimmed.split_whitespace().collect();
            if tokens.first().copied() != Some("band") {
                return Err(PolicyError::Parse {
                    line: line_no,
                    message: "expected 'band'".to_string(),
                });
            }
            if tokens.len() != 4 {
                return Err(PolicyError::Parse {
                    line: line_no,
                    message: "band expects: band <low> <high> <effect-id>".to_string(),
                });
            }

            let range_low = parse_f32(tokens[1], line_no, "invalid low bound")?;
            let range_high = parse_f32(tokens[2], line_no, "invalid high bound")?;
            let effect_id = tokens[3].to_string();

            bands.push(PolicyBand {
                range_low,
                range_high,
                effect_id,
            });
        }

        let policy = Self { bands };
        policy.validate()?;
        Ok(policy)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let text =
            std::fs::read_to_string(path.as_ref()).map_err(|e| PolicyError::Io(e.to_string()))?;
        Self::parse(&text)
    }

    /// The ladder the original patch hardcoded, as a starting table.
    pub fn default_table() -> Self {
        Self {
            bands: vec![
                band(0.0, 6.0, "fractal:mandelbrot"),
                band(6.0, 10.0, "fractal:julia"),
                band(10.0, 14.0, "fractal:burning-ship"),
                band(14.0, 20.0, "color:acid"),
                band(20.0, f32::MAX, "color:strobe"),
            ],
        }
    }

    pub fn bands(&self) -> &[PolicyBand] {
        &self.bands
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.bands.is_empty() {
            return Err(PolicyError::EmptyTable);
        }
        for b in &self.bands {
            if b.range_low.is_nan() || b.range_high.is_nan() || b.range_low >= b.range_high {
                return Err(PolicyError::InvalidRange {
                    effect: b.effect_id.clone(),
                    low: b.range_low,
                    high: b.range_high,
                });
            }
        }
        Ok(())
    }

    /// First band whose half-open range `[low, high)` contains `vol`.
    pub fn select(&self, vol: f32) -> Option<&str> {
        self.bands
            .iter()
            .find(|b| vol >= b.range_low && vol < b.range_high)
            .map(|b| b.effect_id.as_str())
    }

    pub fn to_text(&self) -> String {
        self.bands
            .iter()
            .map(|b| format!("band {:.6} {:.6} {}", b.range_low, b.range_high, b.effect_id))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn band(range_low: f32, range_high: f32, effect_id: &str) -> PolicyBand {
    PolicyBand {
        range_low,
        range_high,
        effect_id: effect_id.to_string(),
    }
}

fn parse_f32(s: &str, line: usize, msg: &str) -> Result<f32, PolicyError> {
    let v = s.parse::<f32>().map_err(|_| PolicyError::Parse {
        line,
        message: msg.to_string(),
    })?;
    if v.is_nan() {
        return Err(PolicyError::Parse {
            line,
            message: msg.to_string(),
        });
    }
    Ok(v)
}
