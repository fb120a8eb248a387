use serde::{
    de::{MapAccess, Visitor},
    Deserialize, Deserializer,
};
use std::{collections::BTreeMap, fmt};

/// `name -> id` entries of the label mapping file, in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelMapping(pub Vec<(String, i64)>);

impl<'de> Deserialize<'de> for LabelMapping {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = LabelMapping;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of class name to integer id")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<LabelMapping, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(entry) = map.next_entry::<String, i64>()? {
                    entries.push(entry);
                }
                Ok(LabelMapping(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

/// Maps the model's raw class ids to display names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelDecoder {
    names: BTreeMap<i64, String>,
}

impl LabelDecoder {
    /// Decoder with no mapping; every id decodes to `Class <id>`.
    pub fn absent() -> Self {
        Self::default()
    }

    /// Inverts `name -> id` entries as written by training. When several
    /// names share an id, the one seen last wins.
    pub fn from_name_to_id<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, i64)>,
    {
        Self {
            names: entries.into_iter().map(|(name, id)| (id, name)).collect(),
        }
    }

    pub fn decode(&self, id: i64) -> String {
        match self.names.get(&id) {
            Some(name) => name.clone(),
            None => format!("Class {id}"),
        }
    }

    /// Class names ordered by id.
    pub fn class_names(&self) -> Vec<String> {
        self.names.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping() -> LabelDecoder {
        LabelDecoder::from_name_to_id([
            ("Insufficient_Weight".to_string(), 0),
            ("Normal_Weight".to_string(), 1),
            ("Obesity_Type_I".to_string(), 2),
        ])
    }

    #[test]
    fn decodes_mapped_ids() {
        let decoder = mapping();
        assert_eq!(decoder.decode(1), "Normal_Weight");
        assert_eq!(decoder.decode(1), decoder.decode(1));
    }

    #[test]
    fn unmapped_id_is_synthetic() {
        assert_eq!(mapping().decode(6), "Class 6");
    }

    #[test]
    fn absent_mapping_is_synthetic() {
        for id in [-1, 0, 3, 42] {
            assert_eq!(LabelDecoder::absent().decode(id), format!("Class {id}"));
        }
    }

    #[test]
    fn duplicate_ids_keep_last_name_in_file() {
        let mapping: LabelMapping =
            serde_json::from_str(r#"{"Zeta": 0, "Alpha": 0, "Normal_Weight": 1}"#).unwrap();
        assert_eq!(
            mapping.0,
            vec![
                ("Zeta".to_string(), 0),
                ("Alpha".to_string(), 0),
                ("Normal_Weight".to_string(), 1),
            ]
        );

        let decoder = LabelDecoder::from_name_to_id(mapping.0);
        assert_eq!(decoder.decode(0), "Alpha");
        assert_eq!(decoder.decode(1), "Normal_Weight");
    }

    #[test]
    fn non_integer_id_is_rejected() {
        assert!(serde_json::from_str::<LabelMapping>(r#"{"Normal_Weight": "one"}"#).is_err());
        assert!(serde_json::from_str::<LabelMapping>(r#"["Normal_Weight"]"#).is_err());
    }

    #[test]
    fn class_names_follow_ids() {
        assert_eq!(
            mapping().class_names(),
            ["Insufficient_Weight", "Normal_Weight", "Obesity_Type_I"]
        );
    }
}
