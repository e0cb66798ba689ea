//! Conditions evaluation report.
//!
//! The report answers "why was X (not) activated". It has one entry per
//! candidate in discovery order, independent of whether the run completed,
//! so a partial report from a failed run is still meaningful.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::candidate::CandidateRegistry;
use crate::ordering::OrderedPlan;

/// Lifecycle state of a unit within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitState {
    Pending,
    Evaluating,
    Accepted,
    Rejected,
    Excluded,
}

impl UnitState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Accepted | Self::Rejected | Self::Excluded)
    }
}

/// Which phase decided a unit's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationPhase {
    /// Class-path and property conditions, before ordering.
    Static,
    /// Bean-registry conditions, in plan order.
    Registry,
}

/// Final record for one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitReport {
    pub unit_id: String,
    pub state: UnitState,
    pub phase: Option<EvaluationPhase>,
    /// Reasons in evaluation order: static conditions first, then registry
    /// conditions from the last evaluation.
    pub reasons: Vec<String>,
    /// Registry generation produced by this unit's acceptance.
    pub accepted_generation: Option<u64>,
    /// Set when the unit was excluded by another (accepted) unit.
    pub excluded_by: Option<String>,
    /// No conditions and no bean requirements.
    pub unconditional: bool,
}

/// The full evaluation report of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub units: Vec<UnitReport>,
    /// Accepted unit ids in plan order; `accepted_generation` gives the
    /// order in which they were accepted.
    pub accepted_order: Vec<String>,
    /// Plan over phase-1 survivors; `None` if the run failed before ordering.
    pub plan: Option<OrderedPlan>,
    /// Excluded ids that matched no candidate.
    pub unknown_exclusions: Vec<String>,
    /// Number of phase-2 passes performed.
    pub passes: usize,
    /// Registry generation at the end of the run.
    pub final_generation: u64,
}

impl EvaluationReport {
    /// A report with every candidate `Pending`.
    pub fn new(registry: &CandidateRegistry) -> Self {
        let units = registry
            .iter()
            .map(|u| UnitReport {
                unit_id: u.id.clone(),
                state: UnitState::Pending,
                phase: None,
                reasons: Vec::new(),
                accepted_generation: None,
                excluded_by: None,
                unconditional: u.is_unconditional(),
            })
            .collect();
        Self {
            units,
            accepted_order: Vec::new(),
            plan: None,
            unknown_exclusions: Vec::new(),
            passes: 0,
            final_generation: 0,
        }
    }

    /// Entry at discovery position `pos`.
    pub(crate) fn entry_mut(&mut self, pos: usize) -> &mut UnitReport {
        &mut self.units[pos]
    }

    pub fn unit(&self, id: &str) -> Option<&UnitReport> {
        self.units.iter().find(|u| u.unit_id == id)
    }

    pub fn state_of(&self, id: &str) -> Option<UnitState> {
        self.unit(id).map(|u| u.state)
    }

    fn in_state(&self, state: UnitState) -> impl Iterator<Item = &UnitReport> {
        self.units.iter().filter(move |u| u.state == state)
    }

    pub fn accepted(&self) -> impl Iterator<Item = &UnitReport> {
        self.accepted_order.iter().filter_map(|id| self.unit(id))
    }

    pub fn rejected(&self) -> impl Iterator<Item = &UnitReport> {
        self.in_state(UnitState::Rejected)
    }

    pub fn excluded(&self) -> impl Iterator<Item = &UnitReport> {
        self.in_state(UnitState::Excluded)
    }

    /// Units that never reached a terminal state (only in failed runs).
    pub fn unresolved(&self) -> impl Iterator<Item = &UnitReport> {
        self.units.iter().filter(|u| !u.state.is_terminal())
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Hex SHA-256 over the canonical JSON form.
    ///
    /// Equal digests mean equal reports; runs with identical inputs must
    /// produce identical digests.
    pub fn digest(&self) -> serde_json::Result<String> {
        let canonical = serde_json::to_vec(self)?;
        Ok(hex::encode(Sha256::digest(&canonical)))
    }

    /// Flat, stable-ordered listing suitable for logs.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        push_heading(&mut out, "CONDITIONS EVALUATION REPORT", '=');

        push_heading(&mut out, "Positive matches:", '-');
        let mut any = false;
        for unit in self.accepted() {
            any = true;
            match unit.accepted_generation {
                Some(generation) => out.push_str(&format!(
                    "   {} (generation {})\n",
                    unit.unit_id, generation
                )),
                None => out.push_str(&format!("   {}\n", unit.unit_id)),
            }
            push_reasons(&mut out, &unit.reasons);
        }
        if !any {
            out.push_str("   None\n");
        }
        out.push('\n');

        push_heading(&mut out, "Negative matches:", '-');
        let mut any = false;
        for unit in self.rejected() {
            any = true;
            let phase = match unit.phase {
                Some(EvaluationPhase::Static) => " [static]",
                Some(EvaluationPhase::Registry) => " [registry]",
                None => "",
            };
            out.push_str(&format!("   {}{}\n", unit.unit_id, phase));
            push_reasons(&mut out, &unit.reasons);
        }
        if !any {
            out.push_str("   None\n");
        }
        out.push('\n');

        push_heading(&mut out, "Exclusions:", '-');
        let mut any = false;
        for unit in self.excluded() {
            any = true;
            match &unit.excluded_by {
                Some(by) => out.push_str(&format!("   {} (excluded by {})\n", unit.unit_id, by)),
                None => out.push_str(&format!("   {} (excluded explicitly)\n", unit.unit_id)),
            }
        }
        if !any {
            out.push_str("   None\n");
        }
        out.push('\n');

        push_heading(&mut out, "Unconditional units:", '-');
        let mut any = false;
        for unit in self.accepted().filter(|u| u.unconditional) {
            any = true;
            out.push_str(&format!("   {}\n", unit.unit_id));
        }
        if !any {
            out.push_str("   None\n");
        }

        if !self.unknown_exclusions.is_empty() {
            out.push('\n');
            push_heading(&mut out, "Unknown exclusions:", '-');
            for id in &self.unknown_exclusions {
                out.push_str(&format!("   {}\n", id));
            }
        }

        let (aborted, pending): (Vec<&UnitReport>, Vec<&UnitReport>) = self
            .unresolved()
            .partition(|u| u.state == UnitState::Evaluating);
        for (title, units) in [
            ("Aborted during evaluation:", aborted),
            ("Not evaluated:", pending),
        ] {
            if units.is_empty() {
                continue;
            }
            out.push('\n');
            push_heading(&mut out, title, '-');
            for unit in units {
                out.push_str(&format!("   {}\n", unit.unit_id));
                push_reasons(&mut out, &unit.reasons);
            }
        }

        out
    }
}

fn push_heading(out: &mut String, title: &str, underline: char) {
    out.push_str(title);
    out.push('\n');
    out.extend(std::iter::repeat(underline).take(title.len()));
    out.push_str("\n\n");
}

fn push_reasons(out: &mut String, reasons: &[String]) {
    for reason in reasons {
        out.push_str(&format!("      - {}\n", reason));
    }
}
