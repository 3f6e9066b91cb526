//! Typed parameter ranges and the search space they form.
use std::collections::HashMap;

/// A concrete parameter assignment, tagged to match its range variant.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// Value of an integer parameter.
    Int(i64),

    /// Value of a floating point parameter.
    Float(f64),

    /// Index into the choices of a categorical parameter.
    Categorical(usize),
}

impl ParamValue {
    /// Returns the integer payload, if this is an `Int` value.
    pub fn as_int(&self) -> Option<i64> {
        if let Self::Int(v) = self {
            Some(*v)
        } else {
            None
        }
    }

    /// Returns the float payload, if this is a `Float` value.
    pub fn as_float(&self) -> Option<f64> {
        if let Self::Float(v) = self {
            Some(*v)
        } else {
            None
        }
    }

    /// Returns the choice index, if this is a `Categorical` value.
    pub fn as_categorical(&self) -> Option<usize> {
        if let Self::Categorical(v) = self {
            Some(*v)
        } else {
            None
        }
    }
}

/// A half-open interval in the internal (transformed) parameter space.
///
/// Numeric parameters are mapped to `f64` before density estimation or
/// evolution-strategy updates: linearly for plain ranges, through `ln` for
/// log ranges, and to the choice index for categorical ranges.
#[derive(Debug, Clone, Copy)]
pub struct Interval {
    start: f64,
    end: f64,
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

impl Interval {
    pub(crate) fn new(start: f64, end: f64) -> Self {
        debug_assert!(start < end);
        Self { start, end }
    }

    /// Returns the inclusive lower bound.
    pub fn start(self) -> f64 {
        self.start
    }

    /// Returns the exclusive upper bound.
    pub fn end(self) -> f64 {
        self.end
    }

    /// Returns the width of this interval.
    pub fn width(self) -> f64 {
        self.end - self.start
    }

    /// Returns the midpoint of this interval.
    pub fn midpoint(self) -> f64 {
        (self.start + self.end) * 0.5
    }

    /// Returns `true` if `v` lies within this interval.
    pub fn contains(self, v: f64) -> bool {
        self.start <= v && v < self.end
    }

    /// Clamps `v` into this interval.
    pub fn clamp(self, v: f64) -> f64 {
        v.max(self.start).min(self.end)
    }
}

/// One named parameter range of a search space.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterRange {
    /// Integers in `[low, high]`, discretized by `step`.
    Int {
        /// Parameter name.
        name: String,
        /// Inclusive lower bound.
        low: i64,
        /// Inclusive upper bound.
        high: i64,
        /// Grid step, at least 1.
        step: i64,
    },

    /// Reals in `[low, high]`, optionally sampled in log space.
    Float {
        /// Parameter name.
        name: String,
        /// Inclusive lower bound.
        low: f64,
        /// Inclusive upper bound.
        high: f64,
        /// Whether sampling and density estimation happen on `ln(x)`.
        log: bool,
    },

    /// An ordered, non-empty list of opaque choices compared by equality.
    Categorical {
        /// Parameter name.
        name: String,
        /// The available choices.
        choices: Vec<String>,
    },
}

impl ParameterRange {
    /// Makes an integer range with step 1.
    pub fn int(name: &str, low: i64, high: i64) -> Result<Self, SearchSpaceError> {
        Self::int_with_step(name, low, high, 1)
    }

    /// Makes an integer range discretized by `step`.
    pub fn int_with_step(
        name: &str,
        low: i64,
        high: i64,
        step: i64,
    ) -> Result<Self, SearchSpaceError> {
        if step < 1 {
            return Err(SearchSpaceError::NonPositiveStep);
        }
        if low > high {
            return Err(SearchSpaceError::EmptyRange);
        }
        Ok(Self::Int {
            name: name.to_owned(),
            low,
            high,
            step,
        })
    }

    /// Makes a floating point range sampled on the linear scale.
    pub fn float(name: &str, low: f64, high: f64) -> Result<Self, SearchSpaceError> {
        Self::float_range(name, low, high, false)
    }

    /// Makes a floating point range sampled on the `ln` scale.
    ///
    /// Both bounds must be strictly positive.
    pub fn log_float(name: &str, low: f64, high: f64) -> Result<Self, SearchSpaceError> {
        Self::float_range(name, low, high, true)
    }

    fn float_range(name: &str, low: f64, high: f64, log: bool) -> Result<Self, SearchSpaceError> {
        if !(high - low).is_finite() {
            return Err(SearchSpaceError::NonFiniteRange);
        }
        if !(low < high) {
            return Err(SearchSpaceError::EmptyRange);
        }
        if log && !(low > 0.0) {
            return Err(SearchSpaceError::NonPositiveLogBound);
        }
        Ok(Self::Float {
            name: name.to_owned(),
            low,
            high,
            log,
        })
    }

    /// Makes a categorical range over the given choices.
    pub fn categorical(name: &str, choices: Vec<String>) -> Result<Self, SearchSpaceError> {
        if choices.is_empty() {
            return Err(SearchSpaceError::EmptyChoices);
        }
        Ok(Self::Categorical {
            name: name.to_owned(),
            choices,
        })
    }

    /// Returns the parameter name.
    pub fn name(&self) -> &str {
        match self {
            Self::Int { name, .. } => name,
            Self::Float { name, .. } => name,
            Self::Categorical { name, .. } => name,
        }
    }

    /// Returns `true` if `v` has the matching variant and lies in this range's support.
    pub fn contains(&self, v: &ParamValue) -> bool {
        match (self, v) {
            (Self::Int { low, high, step, .. }, ParamValue::Int(v)) => {
                *low <= *v && *v <= *high && (*v - *low) % *step == 0
            }
            (Self::Float { low, high, .. }, ParamValue::Float(v)) => *low <= *v && *v <= *high,
            (Self::Categorical { choices, .. }, ParamValue::Categorical(i)) => *i < choices.len(),
            _ => false,
        }
    }

    /// Returns the interval this range spans in the internal space.
    ///
    /// Integer grids include a half-step margin on both sides so every grid
    /// point keeps a non-degenerate neighborhood; categorical ranges map to
    /// `0..cardinality`.
    pub fn internal_interval(&self) -> Interval {
        match self {
            Self::Int { low, high, step, .. } => Interval::new(
                *low as f64 - *step as f64 * 0.5,
                *high as f64 + *step as f64 * 0.5,
            ),
            Self::Float { low, high, log, .. } => {
                if *log {
                    Interval::new(low.ln(), high.ln())
                } else {
                    Interval::new(*low, *high)
                }
            }
            Self::Categorical { choices, .. } => Interval::new(0.0, choices.len() as f64),
        }
    }

    /// Maps a value of this range into the internal space.
    ///
    /// Returns `None` on a variant mismatch.
    pub fn to_internal(&self, v: &ParamValue) -> Option<f64> {
        match (self, v) {
            (Self::Int { .. }, ParamValue::Int(v)) => Some(*v as f64),
            (Self::Float { log, .. }, ParamValue::Float(v)) => {
                Some(if *log { v.ln() } else { *v })
            }
            (Self::Categorical { .. }, ParamValue::Categorical(i)) => Some(*i as f64),
            _ => None,
        }
    }

    /// Maps an internal-space coordinate back to a value of this range.
    ///
    /// The result is clamped into the range's support; integers are rounded
    /// to the nearest grid point.
    pub fn from_internal(&self, x: f64) -> ParamValue {
        match self {
            Self::Int {
                low, high, step, ..
            } => {
                let steps = ((x - *low as f64) / *step as f64).round() as i64;
                let max_steps = (*high - *low) / *step;
                let v = *low + steps.max(0).min(max_steps) * *step;
                ParamValue::Int(v)
            }
            Self::Float { low, high, log, .. } => {
                let v = if *log { x.exp() } else { x };
                ParamValue::Float(v.max(*low).min(*high))
            }
            Self::Categorical { choices, .. } => {
                let i = (x.floor().max(0.0) as usize).min(choices.len() - 1);
                ParamValue::Categorical(i)
            }
        }
    }
}

/// An ordered, immutable collection of uniquely named parameter ranges.
#[derive(Debug, Clone)]
pub struct SearchSpace {
    ranges: Vec<ParameterRange>,
    index: HashMap<String, usize>,
}

impl SearchSpace {
    /// Makes a new search space from the given ranges.
    ///
    /// Fails if two ranges share a name.
    pub fn new(ranges: Vec<ParameterRange>) -> Result<Self, SearchSpaceError> {
        let mut index = HashMap::with_capacity(ranges.len());
        for (i, range) in ranges.iter().enumerate() {
            if index.insert(range.name().to_owned(), i).is_some() {
                return Err(SearchSpaceError::DuplicateName {
                    name: range.name().to_owned(),
                });
            }
        }
        Ok(Self { ranges, index })
    }

    /// Returns the ranges in declaration order.
    pub fn ranges(&self) -> &[ParameterRange] {
        &self.ranges
    }

    /// Returns the range named `name`, if any.
    pub fn get(&self, name: &str) -> Option<&ParameterRange> {
        self.index.get(name).map(|&i| &self.ranges[i])
    }

    /// Returns the position of the range named `name`, if any.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Returns the number of parameters.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Returns `true` if this search space has no parameters.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Iterates over the ranges in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &ParameterRange> {
        self.ranges.iter()
    }
}

/// Possible errors during search space construction.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SearchSpaceError {
    /// The bounds of a range must be finite.
    #[error("not a finite range")]
    NonFiniteRange,

    /// The lower bound of a range must not exceed the upper bound.
    #[error("an empty range")]
    EmptyRange,

    /// Log-scaled ranges require strictly positive bounds.
    #[error("log ranges require strictly positive bounds")]
    NonPositiveLogBound,

    /// Integer ranges require a step of at least 1.
    #[error("the step of an integer range must be positive")]
    NonPositiveStep,

    /// A categorical range needs at least one choice.
    #[error("a categorical range needs at least one choice")]
    EmptyChoices,

    /// Every parameter name in a search space must be unique.
    #[error("duplicate parameter name {name:?}")]
    DuplicateName {
        /// The offending name.
        name: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_names_are_rejected() {
        let ranges = vec![
            ParameterRange::float("x", 0.0, 1.0).unwrap(),
            ParameterRange::int("x", 0, 10).unwrap(),
        ];
        assert!(matches!(
            SearchSpace::new(ranges),
            Err(SearchSpaceError::DuplicateName { .. })
        ));
    }

    #[test]
    fn invalid_bounds_are_rejected() {
        assert!(ParameterRange::float("x", 1.0, 1.0).is_err());
        assert!(ParameterRange::float("x", 0.0, std::f64::INFINITY).is_err());
        assert!(ParameterRange::log_float("x", 0.0, 1.0).is_err());
        assert!(ParameterRange::int("x", 5, 4).is_err());
        assert!(ParameterRange::int_with_step("x", 0, 10, 0).is_err());
        assert!(ParameterRange::categorical("x", vec![]).is_err());
    }

    #[test]
    fn int_grid_round_trip() {
        let range = ParameterRange::int_with_step("n", 2, 11, 3).unwrap();
        assert!(range.contains(&ParamValue::Int(8)));
        assert!(!range.contains(&ParamValue::Int(9)));
        assert_eq!(range.from_internal(9.1), ParamValue::Int(8));
        assert_eq!(range.from_internal(100.0), ParamValue::Int(11));
        assert_eq!(range.from_internal(-100.0), ParamValue::Int(2));
    }

    #[test]
    fn log_transform_round_trip() {
        let range = ParameterRange::log_float("lr", 1e-4, 1.0).unwrap();
        let x = range.to_internal(&ParamValue::Float(1e-2)).unwrap();
        assert!((x - (1e-2f64).ln()).abs() < 1e-12);
        let back = range.from_internal(x);
        assert!((back.as_float().unwrap() - 1e-2).abs() < 1e-12);
    }

    #[test]
    fn categorical_untransform_clamps() {
        let range =
            ParameterRange::categorical("opt", vec!["sgd".into(), "adam".into()]).unwrap();
        assert_eq!(range.from_internal(1.7), ParamValue::Categorical(1));
        assert_eq!(range.from_internal(5.0), ParamValue::Categorical(1));
        assert_eq!(range.from_internal(-1.0), ParamValue::Categorical(0));
    }

    #[test]
    fn lookup_follows_declaration_order() {
        let space = SearchSpace::new(vec![
            ParameterRange::float("a", 0.0, 1.0).unwrap(),
            ParameterRange::int("b", 0, 3).unwrap(),
        ])
        .unwrap();
        assert_eq!(space.index_of("b"), Some(1));
        assert_eq!(space.get("a").map(|r| r.name()), Some("a"));
        assert!(space.get("c").is_none());
    }
}
