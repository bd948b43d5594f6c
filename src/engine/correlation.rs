// Geospatial correlation engine.
//
// Pure data transforms from one species' occurrence coordinates to the two
// renderable map layers: heatmap density samples and similarity-weighted
// connection arcs. The engine owns the SpeciesProfile set for the lifetime
// of one analysis session and recomputes layers wholesale on every species
// switch; no incremental diffing.
//
// Distances are planar in coordinate-degree space, not great-circle. That
// undercounts similarity near the poles and is kept as-is.

use super::analysis::{AnalysisError, AnalysisResult};

/// One recorded sighting coordinate for a species.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OccurrencePoint {
    pub lat: f64,
    pub lng: f64,
}

/// All occurrence data for one identified species.
#[derive(Debug, Clone)]
pub struct SpeciesProfile {
    /// Unique key within one analysis result.
    pub scientific_name: String,
    pub points: Vec<OccurrencePoint>,
    /// Identification confidence in [0, 1]; drives beacon pulse amplitude.
    pub confidence: f64,
    /// Display metadata carried through from the analysis service.
    pub classification: Option<String>,
    pub location: Option<String>,
}

/// One weighted geographic point feeding the density layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeatmapSample {
    pub lat: f64,
    pub lng: f64,
    pub weight: f64,
}

/// A styled connection between two occurrence points of the same species.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionArc {
    pub start: OccurrencePoint,
    pub end: OccurrencePoint,
    /// Spatial closeness in (0, 1]; floored so distant pairs stay visible.
    pub similarity: f64,
    pub alpha: f64,
    pub stroke_width: f64,
}

// ============================================================================
// LAYER CONFIGURATION
// ============================================================================

#[derive(Debug, Clone)]
pub struct LayerConfig {
    /// Constant weight assigned to every heatmap sample. Not aggregated.
    pub heatmap_weight: f64,
    /// Arc generation considers only the first `arc_point_cap` points, in
    /// list order. Bounds output at C(cap, 2) pairs; not a ranking.
    pub arc_point_cap: usize,
    /// Lower bound on similarity so near-antipodal pairs render faintly
    /// instead of vanishing.
    pub similarity_floor: f64,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            heatmap_weight: 0.8,
            arc_point_cap: 10,
            similarity_floor: 0.1,
        }
    }
}

// ============================================================================
// PURE TRANSFORMS
// ============================================================================

/// One sample per input point, constant weight. Empty in, empty out.
pub fn compute_heatmap(points: &[OccurrencePoint], weight: f64) -> Vec<HeatmapSample> {
    points
        .iter()
        .map(|p| HeatmapSample { lat: p.lat, lng: p.lng, weight })
        .collect()
}

/// Pairwise arcs over the first `cfg.arc_point_cap` points.
///
/// For each unordered pair (i < j):
///   distance   = planar Euclidean norm of (Δlat, Δlng) in degrees
///   similarity = max(floor, 1 − distance / 180)
///   alpha      = similarity × 0.7, stroke = similarity × 0.6
///
/// Output order is pair-generation order (i ascending, then j), so identical
/// input yields an identical arc list.
pub fn compute_connection_arcs(points: &[OccurrencePoint], cfg: &LayerConfig) -> Vec<ConnectionArc> {
    let capped = &points[..points.len().min(cfg.arc_point_cap)];
    if capped.len() < 2 {
        return Vec::new();
    }

    let mut arcs = Vec::with_capacity(capped.len() * (capped.len() - 1) / 2);
    for i in 0..capped.len() {
        for j in (i + 1)..capped.len() {
            let a = capped[i];
            let b = capped[j];
            let distance = ((a.lat - b.lat).powi(2) + (a.lng - b.lng).powi(2)).sqrt();
            let similarity = (1.0 - distance / 180.0).max(cfg.similarity_floor);
            arcs.push(ConnectionArc {
                start: a,
                end: b,
                similarity,
                alpha: similarity * 0.7,
                stroke_width: similarity * 0.6,
            });
        }
    }
    arcs
}

// ============================================================================
// ENGINE STATE
// ============================================================================

/// Holds the profiles of the current analysis session plus the selection.
/// Layers are derived on demand from the selected profile, never cached:
/// a species switch invalidates everything downstream by construction.
pub struct CorrelationEngine {
    config: LayerConfig,
    profiles: Vec<SpeciesProfile>,
    selected: Option<usize>,
}

impl CorrelationEngine {
    pub fn new(config: LayerConfig) -> Self {
        Self {
            config,
            profiles: Vec::new(),
            selected: None,
        }
    }

    /// Replace the whole profile set from a parsed analysis result.
    ///
    /// Species whose coordinate list is empty after parsing are dropped;
    /// a result with zero usable species is reported as an error and leaves
    /// the previous session untouched. The first usable species becomes the
    /// selection.
    pub fn rebuild_from_analysis(&mut self, result: &AnalysisResult) -> Result<usize, AnalysisError> {
        let mut profiles: Vec<SpeciesProfile> = Vec::new();
        for entry in &result.geo_profiles {
            let points: Vec<OccurrencePoint> = entry
                .parse_points()
                .into_iter()
                .map(|(lat, lng)| OccurrencePoint { lat, lng })
                .collect();
            if points.is_empty() {
                log::warn!(
                    "dropping species '{}': no usable coordinates",
                    entry.scientific_name
                );
                continue;
            }
            profiles.push(SpeciesProfile {
                scientific_name: entry.scientific_name.clone(),
                points,
                confidence: entry.confidence,
                classification: entry.classification.clone(),
                location: entry.location.clone(),
            });
        }

        if profiles.is_empty() {
            return Err(AnalysisError::NoUsableSpecies);
        }

        log::info!("analysis session loaded: {} species with coordinates", profiles.len());
        self.profiles = profiles;
        self.selected = Some(0);
        Ok(self.profiles.len())
    }

    /// Swap the active species. Derived layers from the previous selection
    /// are stale immediately; callers recompute both on every switch.
    pub fn select_species(&mut self, name: &str) -> Result<(), AnalysisError> {
        match self.profiles.iter().position(|p| p.scientific_name == name) {
            Some(idx) => {
                self.selected = Some(idx);
                Ok(())
            }
            None => Err(AnalysisError::UnknownSpecies(name.to_string())),
        }
    }

    pub fn selected_profile(&self) -> Option<&SpeciesProfile> {
        self.selected.map(|idx| &self.profiles[idx])
    }

    pub fn profiles(&self) -> &[SpeciesProfile] {
        &self.profiles
    }

    /// Heatmap layer for the current selection. Empty when nothing is selected.
    pub fn heatmap(&self) -> Vec<HeatmapSample> {
        match self.selected_profile() {
            Some(profile) => compute_heatmap(&profile.points, self.config.heatmap_weight),
            None => Vec::new(),
        }
    }

    /// Arc layer for the current selection. Empty when nothing is selected.
    pub fn connection_arcs(&self) -> Vec<ConnectionArc> {
        match self.selected_profile() {
            Some(profile) => compute_connection_arcs(&profile.points, &self.config),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(lat: f64, lng: f64) -> OccurrencePoint {
        OccurrencePoint { lat, lng }
    }

    fn fan(n: usize) -> Vec<OccurrencePoint> {
        (0..n).map(|i| pt(i as f64, -(i as f64) * 2.0)).collect()
    }

    #[test]
    fn heatmap_is_one_sample_per_point() {
        assert!(compute_heatmap(&[], 0.8).is_empty());

        let samples = compute_heatmap(&[pt(10.0, 20.0), pt(-5.0, 3.0)], 0.8);
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0], HeatmapSample { lat: 10.0, lng: 20.0, weight: 0.8 });
        assert_eq!(samples[1], HeatmapSample { lat: -5.0, lng: 3.0, weight: 0.8 });
    }

    #[test]
    fn arcs_need_two_points() {
        let cfg = LayerConfig::default();
        assert!(compute_connection_arcs(&[], &cfg).is_empty());
        assert!(compute_connection_arcs(&[pt(0.0, 0.0)], &cfg).is_empty());
    }

    #[test]
    fn two_points_make_one_arc_with_expected_similarity() {
        let cfg = LayerConfig::default();
        let arcs = compute_connection_arcs(&[pt(0.0, 0.0), pt(0.0, 90.0)], &cfg);
        assert_eq!(arcs.len(), 1);

        // distance 90 → similarity 0.5 → alpha 0.35, stroke 0.30.
        let arc = &arcs[0];
        assert!((arc.similarity - 0.5).abs() < 1e-9);
        assert!((arc.alpha - 0.35).abs() < 1e-9);
        assert!((arc.stroke_width - 0.30).abs() < 1e-9);
    }

    #[test]
    fn similarity_is_floored_for_distant_pairs() {
        let cfg = LayerConfig::default();
        let arcs = compute_connection_arcs(&[pt(-85.0, -170.0), pt(85.0, 170.0)], &cfg);
        assert_eq!(arcs.len(), 1);
        assert_eq!(arcs[0].similarity, 0.1);
    }

    #[test]
    fn arc_count_is_capped_at_first_ten_points() {
        let cfg = LayerConfig::default();
        assert_eq!(compute_connection_arcs(&fan(10), &cfg).len(), 45);
        assert_eq!(compute_connection_arcs(&fan(12), &cfg).len(), 45);

        // Truncation is positional: point 11 never appears in any arc.
        let points = fan(12);
        for arc in compute_connection_arcs(&points, &cfg) {
            assert!(arc.start.lat < 10.0);
            assert!(arc.end.lat < 10.0);
        }
    }

    #[test]
    fn arc_order_is_deterministic_pair_order() {
        let cfg = LayerConfig::default();
        let points = fan(4);
        let arcs = compute_connection_arcs(&points, &cfg);
        assert_eq!(arcs.len(), 6);

        let expected = [(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)];
        for (arc, (i, j)) in arcs.iter().zip(expected) {
            assert_eq!(arc.start, points[i]);
            assert_eq!(arc.end, points[j]);
            assert!(arc.start != arc.end);
        }
    }

    #[test]
    fn all_empty_coordinates_is_reported_not_loaded() {
        use crate::engine::analysis::{AnalysisError, AnalysisResult};

        let payload = r#"{
            "geo_profiles": [
                {"scientific_name": "Orcinus orca", "coordinates": []},
                {"scientific_name": "Thunnus albacares", "coordinates": "No coordinates found"}
            ]
        }"#;
        let result = AnalysisResult::from_json(payload).unwrap();

        let mut engine = CorrelationEngine::new(LayerConfig::default());
        assert!(matches!(
            engine.rebuild_from_analysis(&result),
            Err(AnalysisError::NoUsableSpecies)
        ));
        assert!(engine.profiles().is_empty());
        assert!(engine.selected_profile().is_none());
        assert!(engine.heatmap().is_empty());
        assert!(engine.connection_arcs().is_empty());
    }

    #[test]
    fn selection_switches_layers() {
        use crate::engine::analysis::AnalysisResult;

        let payload = r#"{
            "geo_profiles": [
                {"scientific_name": "Orcinus orca", "coordinates": [[-75.0, 0.0], [-70.0, 5.0]], "confidence": 0.9},
                {"scientific_name": "Thunnus albacares", "coordinates": [[30.0, -40.0]], "confidence": 0.7}
            ]
        }"#;
        let result = AnalysisResult::from_json(payload).unwrap();

        let mut engine = CorrelationEngine::new(LayerConfig::default());
        assert_eq!(engine.rebuild_from_analysis(&result).unwrap(), 2);

        // First species selected by default: two points, one arc.
        assert_eq!(engine.heatmap().len(), 2);
        assert_eq!(engine.connection_arcs().len(), 1);

        engine.select_species("Thunnus albacares").unwrap();
        assert_eq!(engine.heatmap().len(), 1);
        assert!(engine.connection_arcs().is_empty());

        assert!(engine.select_species("Carcharodon carcharias").is_err());
        // Failed selection leaves the previous one in place.
        assert_eq!(engine.selected_profile().unwrap().scientific_name, "Thunnus albacares");
    }
}
