//! JSON snapshot boundary: persisting and restoring a study's trial log.
use crate::sampler::Sampler;
use crate::search_space::{ParamValue, ParameterRange, SearchSpace};
use crate::study::{Study, StudyError};
use crate::trial::{Direction, Trial, TrialState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Serialized form of a study.
///
/// Only Complete and Pruned trials are persisted; Running and Fail trials
/// carry no information a restored study could use.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudySnapshot {
    /// Study name.
    pub name: String,

    /// Single-objective direction.
    pub direction: Direction,

    /// Directions vector of a multi-objective study, or `None`.
    pub directions: Option<Vec<Direction>>,

    /// The persisted trials.
    pub trials: Vec<TrialSnapshot>,
}

/// Serialized form of one trial.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialSnapshot {
    /// Trial number.
    pub number: u64,

    /// Lifecycle state.
    pub state: TrialState,

    /// Single objective value.
    pub value: Option<f64>,

    /// Objective vector.
    pub values: Option<Vec<f64>>,

    /// Constraint evaluations.
    pub constraint_values: Option<Vec<f64>>,

    /// Parameters as scalars: floats, ints, or choice strings.
    pub parameters: BTreeMap<String, serde_json::Value>,

    /// Reported intermediate values by step.
    pub intermediate_values: BTreeMap<u64, f64>,
}

impl StudySnapshot {
    /// Captures the persistable state of `study`.
    ///
    /// Fails if a trial carries a parameter name missing from the study's
    /// search space.
    pub fn capture(study: &Study) -> Result<Self, SnapshotError> {
        let space = study.search_space();
        let trials = study
            .trials()
            .iter()
            .filter(|t| t.state == TrialState::Complete || t.state == TrialState::Pruned)
            .map(|t| encode_trial(t, space))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            name: study.name().to_owned(),
            direction: study.direction(),
            directions: study.directions().map(<[Direction]>::to_vec),
            trials,
        })
    }

    /// Decodes the persisted trials by consulting `space`.
    ///
    /// A parameter name absent from the search space, a scalar of the
    /// wrong shape, and an unknown categorical choice are all errors.
    pub fn decode_trials(&self, space: &SearchSpace) -> Result<Vec<Trial>, SnapshotError> {
        self.trials
            .iter()
            .map(|snapshot| decode_trial(snapshot, space))
            .collect()
    }
}

/// Serializes a study to the snapshot JSON format.
pub fn to_json(study: &Study) -> Result<String, SnapshotError> {
    Ok(serde_json::to_string(&StudySnapshot::capture(study)?)?)
}

/// Reconstructs a study from snapshot JSON.
///
/// Samplers are not serialized, so the caller supplies one; the restored
/// study keeps the snapshot's name, directions, trial numbers and states.
pub fn load_study(
    json: &str,
    space: &SearchSpace,
    sampler: Box<dyn Sampler>,
) -> Result<Study, SnapshotError> {
    let snapshot: StudySnapshot = serde_json::from_str(json)?;
    let trials = snapshot.decode_trials(space)?;

    let mut builder = Study::builder(&snapshot.name, space.clone())
        .direction(snapshot.direction)
        .sampler(sampler);
    if let Some(directions) = snapshot.directions {
        builder = builder.directions(directions);
    }
    let study = builder.build()?;
    study.import_snapshot_trials(&trials);
    Ok(study)
}

fn encode_trial(trial: &Trial, space: &SearchSpace) -> Result<TrialSnapshot, SnapshotError> {
    let mut parameters = BTreeMap::new();
    for (name, value) in &trial.params {
        let range = space
            .get(name)
            .ok_or_else(|| SnapshotError::UnknownParameter { name: name.clone() })?;
        let scalar = match (range, value) {
            (ParameterRange::Int { .. }, ParamValue::Int(v)) => serde_json::Value::from(*v),
            (ParameterRange::Float { .. }, ParamValue::Float(v)) => serde_json::Value::from(*v),
            (ParameterRange::Categorical { choices, .. }, ParamValue::Categorical(i)) => {
                serde_json::Value::from(choices[*i].clone())
            }
            _ => return Err(SnapshotError::TypeMismatch { name: name.clone() }),
        };
        parameters.insert(name.clone(), scalar);
    }
    Ok(TrialSnapshot {
        number: trial.number,
        state: trial.state,
        value: trial.value,
        values: trial.values.clone(),
        constraint_values: trial.constraint_values.clone(),
        parameters,
        intermediate_values: trial.intermediate_values(),
    })
}

fn decode_trial(snapshot: &TrialSnapshot, space: &SearchSpace) -> Result<Trial, SnapshotError> {
    let mut params = std::collections::HashMap::new();
    for (name, scalar) in &snapshot.parameters {
        let range = space
            .get(name)
            .ok_or_else(|| SnapshotError::UnknownParameter { name: name.clone() })?;
        let value = match range {
            ParameterRange::Int { .. } => scalar
                .as_i64()
                .map(ParamValue::Int)
                .ok_or_else(|| SnapshotError::TypeMismatch { name: name.clone() })?,
            ParameterRange::Float { .. } => scalar
                .as_f64()
                .map(ParamValue::Float)
                .ok_or_else(|| SnapshotError::TypeMismatch { name: name.clone() })?,
            ParameterRange::Categorical { choices, .. } => {
                let choice = scalar
                    .as_str()
                    .ok_or_else(|| SnapshotError::TypeMismatch { name: name.clone() })?;
                let i = choices.iter().position(|c| c == choice).ok_or_else(|| {
                    SnapshotError::UnknownChoice {
                        name: name.clone(),
                        choice: choice.to_owned(),
                    }
                })?;
                ParamValue::Categorical(i)
            }
        };
        params.insert(name.clone(), value);
    }

    let mut trial = Trial::new(snapshot.number, params);
    trial.state = snapshot.state;
    trial.value = snapshot.value;
    trial.values = snapshot.values.clone();
    trial.constraint_values = snapshot.constraint_values.clone();
    trial.replay_intermediate(&snapshot.intermediate_values);
    Ok(trial)
}

/// Possible errors while writing or reading snapshots.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// The JSON payload could not be encoded or decoded.
    #[error("snapshot JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A persisted parameter name is absent from the search space.
    #[error("parameter {name:?} is not part of the search space")]
    UnknownParameter {
        /// The offending name.
        name: String,
    },

    /// A persisted scalar does not match its range's shape.
    #[error("parameter {name:?} does not match its declared range")]
    TypeMismatch {
        /// The offending name.
        name: String,
    },

    /// A persisted categorical choice is not among the range's choices.
    #[error("parameter {name:?} has unknown choice {choice:?}")]
    UnknownChoice {
        /// The offending name.
        name: String,
        /// The persisted choice.
        choice: String,
    },

    /// The snapshot describes an invalid study configuration.
    #[error("snapshot describes an invalid study: {0}")]
    Study(#[from] StudyError),
}
