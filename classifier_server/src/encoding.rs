//! Encoding of a [`PredictRequest`] into the numeric row the model consumes.
//!
//! Categorical values the table does not recognize are zeroed rather than
//! rejected; a warning is logged so drift in client input stays visible.

use common::PredictRequest;
use tracing::warn;

/// Model features produced by the encoder, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    Weight,
    Height,
    Gender,
    Age,
    Favc,
    Calc,
    Fcvc,
    Ncp,
}

impl Feature {
    pub const ALL: [Feature; 8] = [
        Feature::Weight,
        Feature::Height,
        Feature::Gender,
        Feature::Age,
        Feature::Favc,
        Feature::Calc,
        Feature::Fcvc,
        Feature::Ncp,
    ];

    /// Column name used by the training data.
    pub fn name(self) -> &'static str {
        match self {
            Feature::Weight => "Weight",
            Feature::Height => "Height",
            Feature::Gender => "Gender",
            Feature::Age => "Age",
            Feature::Favc => "FAVC",
            Feature::Calc => "CALC",
            Feature::Fcvc => "FCVC",
            Feature::Ncp => "NCP",
        }
    }

    pub fn from_name(name: &str) -> Option<Feature> {
        Feature::ALL.into_iter().find(|f| f.name() == name)
    }

    fn index(self) -> usize {
        self as usize
    }
}

const ALCOHOL_LEVELS: [(&str, f64); 4] = [
    ("no", 0.0),
    ("Sometimes", 1.0),
    ("Frequently", 2.0),
    ("Always", 3.0),
];

/// Encoded values indexed by [`Feature`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncodedInput([f64; 8]);

impl EncodedInput {
    pub fn get(&self, feature: Feature) -> f64 {
        self.0[feature.index()]
    }
}

pub fn encode(input: &PredictRequest) -> EncodedInput {
    let mut values = [0.0; 8];
    values[Feature::Weight.index()] = input.weight;
    values[Feature::Height.index()] = input.height;
    values[Feature::Gender.index()] = encode_gender(&input.gender);
    values[Feature::Age.index()] = input.age as f64;
    values[Feature::Favc.index()] = encode_yes_no(&input.high_caloric_food);
    values[Feature::Calc.index()] = encode_alcohol(&input.alcohol_intake);
    values[Feature::Fcvc.index()] = input.vegetable_intake as f64;
    values[Feature::Ncp.index()] = input.main_meals as f64;
    EncodedInput(values)
}

fn encode_gender(value: &str) -> f64 {
    if value.eq_ignore_ascii_case("male") {
        return 1.0;
    }
    if !value.eq_ignore_ascii_case("female") {
        warn!(gender = value, "Unrecognized gender, encoding as 0");
    }
    0.0
}

fn encode_yes_no(value: &str) -> f64 {
    if value.eq_ignore_ascii_case("yes") {
        return 1.0;
    }
    if !value.eq_ignore_ascii_case("no") {
        warn!(high_caloric_food = value, "Unrecognized yes/no value, encoding as 0");
    }
    0.0
}

fn encode_alcohol(value: &str) -> f64 {
    match ALCOHOL_LEVELS.iter().find(|(level, _)| *level == value) {
        Some((_, code)) => *code,
        None => {
            warn!(alcohol_intake = value, "Unrecognized alcohol intake, encoding as 0");
            0.0
        }
    }
}

/// Column order expected by the loaded model.
///
/// Names are resolved against [`Feature`] once, at load time. A name the
/// encoder cannot produce stays in its slot and is filled with 0.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureLayout {
    columns: Vec<(String, Option<Feature>)>,
}

impl FeatureLayout {
    /// Declaration order of [`Feature`], used when no ordering was loaded.
    pub fn declaration_order() -> Self {
        Self {
            columns: Feature::ALL
                .into_iter()
                .map(|f| (f.name().to_string(), Some(f)))
                .collect(),
        }
    }

    /// An empty list falls back to [`FeatureLayout::declaration_order`].
    pub fn from_names(names: Vec<String>) -> Self {
        if names.is_empty() {
            return Self::declaration_order();
        }

        let columns: Vec<_> = names
            .into_iter()
            .map(|name| {
                let feature = Feature::from_name(&name);
                (name, feature)
            })
            .collect();

        for (name, _) in columns.iter().filter(|(_, f)| f.is_none()) {
            warn!(feature = %name, "Model expects a feature the encoder does not produce; it will be sent as 0");
        }

        Self { columns }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn arrange(&self, encoded: &EncodedInput) -> Vec<f64> {
        self.columns
            .iter()
            .map(|(_, feature)| feature.map_or(0.0, |f| encoded.get(f)))
            .collect()
    }
}
