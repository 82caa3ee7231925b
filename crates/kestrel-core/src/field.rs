use serde::{Deserialize, Serialize};

/// Field dimensions as reported by vision, in millimeters.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq)]
pub struct FieldRaw {
    pub line_width_mm: f64,
    pub field_width_mm: f64,
    pub field_length_mm: f64,
    pub boundary_width_mm: f64,
    pub referee_width_mm: f64,
    pub goal_width_mm: f64,
    pub goal_depth_mm: f64,
    pub goal_wall_width_mm: f64,
    pub center_circle_radius_mm: f64,
    pub defense_radius_mm: f64,
    pub defense_stretch_mm: f64,
    pub free_kick_from_defense_dist_mm: f64,
    pub penalty_spot_from_field_line_dist_mm: f64,
    pub penalty_line_from_spot_dist_mm: f64,
}

/// Field geometry in field coordinates, meters.
///
/// Note that the field frame is rotated against the vision frame, so
/// `field_height` is the vision `field_length`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq)]
pub struct FieldGeometry {
    pub line_width: f64,
    pub field_width: f64,
    pub field_height: f64,
    pub boundary_width: f64,
    pub referee_width: f64,
    pub goal_width: f64,
    pub goal_depth: f64,
    pub goal_wall_width: f64,
    pub goal_height: f64,
    pub center_circle_radius: f64,
    pub defense_radius: f64,
    pub defense_stretch: f64,
    pub free_kick_from_defense_dist: f64,
    pub penalty_spot_from_field_line_dist: f64,
    pub penalty_line_from_spot_dist: f64,
}

impl FieldGeometry {
    pub fn from_raw(raw: &FieldRaw) -> Self {
        FieldGeometry {
            line_width: raw.line_width_mm / 1000.0,
            field_width: raw.field_width_mm / 1000.0,
            field_height: raw.field_length_mm / 1000.0,
            boundary_width: raw.boundary_width_mm / 1000.0,
            referee_width: raw.referee_width_mm / 1000.0,
            goal_width: raw.goal_width_mm / 1000.0,
            goal_depth: raw.goal_depth_mm / 1000.0,
            goal_wall_width: raw.goal_wall_width_mm / 1000.0,
            goal_height: 0.16,
            center_circle_radius: raw.center_circle_radius_mm / 1000.0,
            defense_radius: raw.defense_radius_mm / 1000.0,
            defense_stretch: raw.defense_stretch_mm / 1000.0,
            free_kick_from_defense_dist: raw.free_kick_from_defense_dist_mm / 1000.0,
            penalty_spot_from_field_line_dist: raw.penalty_spot_from_field_line_dist_mm / 1000.0,
            penalty_line_from_spot_dist: raw.penalty_line_from_spot_dist_mm / 1000.0,
        }
    }
}
