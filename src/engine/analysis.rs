// Typed model of the external analysis-service payload.
//
// The service reports identified species with occurrence coordinates and a
// confidence score, plus summary tables the report view consumes. Only the
// geo profiles matter to this crate; the summary is carried through for the
// debug overlay. The `coordinates` field is polymorphic across service
// generations: older responses hold a single `[lat, lng]` pair, newer ones
// an array of pairs, and failed lookups a string sentinel. Anything that is
// not one of the two numeric shapes drops the species during conversion.

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("malformed analysis payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("analysis result contains no species with usable coordinates")]
    NoUsableSpecies,
    #[error("unknown species '{0}'")]
    UnknownSpecies(String),
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct FileInfo {
    #[serde(default)]
    pub filename: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AbundanceEntry {
    pub species: String,
    pub count: u64,
    pub relative_abundance: f64,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct BiodiversitySummary {
    #[serde(default)]
    pub total_reads_processed: u64,
    #[serde(default)]
    pub unique_species_identified: u64,
    #[serde(default)]
    pub abundance_distribution: Vec<AbundanceEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeoProfile {
    pub scientific_name: String,
    #[serde(default)]
    pub classification: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    /// Raw coordinates value; see `parse_points` for accepted shapes.
    #[serde(default)]
    pub coordinates: Value,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

fn default_confidence() -> f64 {
    0.5
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisResult {
    #[serde(default)]
    pub file_info: FileInfo,
    #[serde(default)]
    pub biodiversity_summary: BiodiversitySummary,
    pub geo_profiles: Vec<GeoProfile>,
}

impl AnalysisResult {
    /// Parse a raw payload. Structural problems (not JSON, missing
    /// `geo_profiles`) fail here; per-species coordinate problems are
    /// handled later by dropping the species.
    pub fn from_json(payload: &str) -> Result<Self, AnalysisError> {
        Ok(serde_json::from_str(payload)?)
    }
}

impl GeoProfile {
    /// Extract (lat, lng) pairs from the polymorphic `coordinates` value.
    ///
    /// Accepted: a single two-number array, or an array of two-number
    /// arrays. Everything else (string sentinel, empty array, short or
    /// non-numeric entries) yields no points.
    pub fn parse_points(&self) -> Vec<(f64, f64)> {
        let Value::Array(items) = &self.coordinates else {
            return Vec::new();
        };

        // Single pair: [lat, lng]
        if let [a, b] = items.as_slice() {
            if let (Some(lat), Some(lng)) = (a.as_f64(), b.as_f64()) {
                return vec![(lat, lng)];
            }
        }

        // Pair list: [[lat, lng], ...]. Malformed entries are skipped.
        items
            .iter()
            .filter_map(|item| {
                let pair = item.as_array()?;
                if pair.len() != 2 {
                    return None;
                }
                Some((pair[0].as_f64()?, pair[1].as_f64()?))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(coordinates: &str) -> GeoProfile {
        let payload = format!(
            r#"{{"scientific_name": "Amphiprion ocellaris", "coordinates": {coordinates}}}"#
        );
        serde_json::from_str(&payload).unwrap()
    }

    #[test]
    fn single_pair_yields_one_point() {
        assert_eq!(profile("[10.5, 100.25]").parse_points(), vec![(10.5, 100.25)]);
    }

    #[test]
    fn pair_list_yields_all_points() {
        let points = profile("[[10.0, 100.0], [-5.0, 98.5]]").parse_points();
        assert_eq!(points, vec![(10.0, 100.0), (-5.0, 98.5)]);
    }

    #[test]
    fn sentinel_and_junk_yield_no_points() {
        assert!(profile(r#""No coordinates found""#).parse_points().is_empty());
        assert!(profile("[]").parse_points().is_empty());
        assert!(profile("null").parse_points().is_empty());
        assert!(profile(r#"[["a", "b"]]"#).parse_points().is_empty());
        assert!(profile("[[1.0]]").parse_points().is_empty());
    }

    #[test]
    fn malformed_entries_are_skipped_not_fatal() {
        let points = profile("[[10.0, 100.0], [1.0], [-5.0, 98.5]]").parse_points();
        assert_eq!(points, vec![(10.0, 100.0), (-5.0, 98.5)]);
    }

    #[test]
    fn missing_confidence_defaults() {
        let p = profile("[1.0, 2.0]");
        assert_eq!(p.confidence, 0.5);
        assert!(p.classification.is_none());
    }

    #[test]
    fn full_payload_round_trip() {
        let payload = r#"{
            "file_info": {"filename": "sample.fasta"},
            "biodiversity_summary": {
                "total_reads_processed": 12000,
                "unique_species_identified": 3,
                "abundance_distribution": [
                    {"species": "Orcinus orca", "count": 9000, "relative_abundance": 0.75}
                ]
            },
            "geo_profiles": [
                {"scientific_name": "Orcinus orca", "classification": "Animalia / Chordata / Mammalia",
                 "location": "Southern Ocean", "coordinates": [-75.0, 0.0], "confidence": 0.9}
            ]
        }"#;
        let result = AnalysisResult::from_json(payload).unwrap();
        assert_eq!(result.file_info.filename, "sample.fasta");
        assert_eq!(result.biodiversity_summary.total_reads_processed, 12000);
        assert_eq!(result.geo_profiles.len(), 1);
        assert_eq!(result.geo_profiles[0].parse_points(), vec![(-75.0, 0.0)]);
    }

    #[test]
    fn not_json_is_a_parse_error() {
        assert!(matches!(
            AnalysisResult::from_json("this is not json"),
            Err(AnalysisError::Json(_))
        ));
        // geo_profiles is required; its absence is structural.
        assert!(AnalysisResult::from_json("{}").is_err());
    }
}
