//! Route model.
//!
//! A [`Route`] is supplied by the directions service and never changes for
//! the lifetime of a navigation session; a reroute replaces it wholesale.
//! Routes are compared by value to tell "same route" from "new route".
//!
//! Voice instructions are addressed by a flat index that walks legs, then
//! steps, then each step's announcements in order.

use serde::{Deserialize, Serialize};

use crate::geo::Point;

/// A spoken announcement attached to a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceInstruction {
    /// Distance before the maneuver at which to announce, in metres.
    pub distance_along_geometry: f64,
    /// Plain-text announcement.
    pub announcement: String,
    /// SSML announcement, used verbatim as the speech request text.
    pub ssml_announcement: String,
}

/// A single maneuver-to-maneuver step.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LegStep {
    /// Step length in metres.
    pub distance: f64,
    /// Expected travel time in seconds.
    pub duration: f64,
    /// Road name.
    #[serde(default)]
    pub name: String,
    /// Polyline of the step.
    #[serde(default)]
    pub geometry: Vec<Point>,
    /// Announcements for this step, farthest first.
    #[serde(default)]
    pub voice_instructions: Vec<VoiceInstruction>,
}

/// A leg between two waypoints.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RouteLeg {
    /// Leg length in metres.
    pub distance: f64,
    /// Expected travel time in seconds.
    pub duration: f64,
    /// Ordered steps.
    pub steps: Vec<LegStep>,
}

/// A complete route.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Route {
    /// Route length in metres.
    pub distance: f64,
    /// Expected travel time in seconds.
    pub duration: f64,
    /// Ordered legs.
    pub legs: Vec<RouteLeg>,
}

impl Route {
    /// Load a route from its JSON representation.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Total number of voice instructions across every leg and step.
    pub fn voice_instruction_count(&self) -> usize {
        self.legs
            .iter()
            .flat_map(|leg| leg.steps.iter())
            .map(|step| step.voice_instructions.len())
            .sum()
    }

    /// Iterate every voice instruction in flat-index order.
    pub fn voice_instructions(&self) -> impl Iterator<Item = &VoiceInstruction> {
        self.legs
            .iter()
            .flat_map(|leg| leg.steps.iter())
            .flat_map(|step| step.voice_instructions.iter())
    }

    /// Voice instruction at the given flat index.
    pub fn voice_instruction(&self, index: usize) -> Option<&VoiceInstruction> {
        self.voice_instructions().nth(index)
    }

    /// Get a leg by index.
    pub fn leg(&self, index: usize) -> Option<&RouteLeg> {
        self.legs.get(index)
    }

    /// Get a step by leg and step index.
    pub fn step(&self, leg_index: usize, step_index: usize) -> Option<&LegStep> {
        self.legs.get(leg_index)?.steps.get(step_index)
    }

    /// Concatenated geometry of one leg.
    pub fn leg_geometry(&self, leg_index: usize) -> Vec<Point> {
        self.legs
            .get(leg_index)
            .map(|leg| concat_geometry(leg.steps.iter()))
            .unwrap_or_default()
    }

    /// Concatenated geometry of the whole route.
    pub fn geometry(&self) -> Vec<Point> {
        concat_geometry(self.legs.iter().flat_map(|leg| leg.steps.iter()))
    }

    /// Sum of the distances of every leg after `leg_index`.
    pub fn distance_after_leg(&self, leg_index: usize) -> f64 {
        self.legs
            .iter()
            .skip(leg_index + 1)
            .map(|leg| leg.distance)
            .sum()
    }

    /// Sum of the durations of every leg after `leg_index`.
    pub fn duration_after_leg(&self, leg_index: usize) -> f64 {
        self.legs
            .iter()
            .skip(leg_index + 1)
            .map(|leg| leg.duration)
            .sum()
    }
}

/// Join step polylines, dropping the duplicated vertex where steps meet.
fn concat_geometry<'a>(steps: impl Iterator<Item = &'a LegStep>) -> Vec<Point> {
    let mut points: Vec<Point> = Vec::new();
    for step in steps {
        for point in &step.geometry {
            if points.last() != Some(point) {
                points.push(*point);
            }
        }
    }
    points
}
