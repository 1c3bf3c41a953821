//! Program Outcome attainment: strength-weighted CO roll-up blended with
//! indirect (survey) attainment.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::attainment::co::CoAttainment;
use crate::attainment::{AttainmentPolicy, AttainmentStatus};
use crate::model::{round2, CoPoMapping, IndirectAttainmentEntry, OutcomeKind, ProgramOutcome};

/// Valid CO-PO correlation strengths.
pub const STRENGTH_RANGE: std::ops::RangeInclusive<u8> = 1..=3;

/// One CO's share of a PO.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoContribution {
    pub co_id: String,
    pub co_code: String,
    pub strength: u8,
    pub co_attainment: f64,
    pub co_status: AttainmentStatus,
}

/// Attainment of one PO or PSO.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoAttainment {
    pub po_id: String,
    pub code: String,
    pub title: String,
    pub kind: OutcomeKind,
    pub target_attainment: f64,
    pub direct_attainment: f64,
    pub indirect_attainment: f64,
    pub indirect_responses: usize,
    pub total_attainment: f64,
    pub direct_weight: f64,
    pub attained: bool,
    pub status: AttainmentStatus,
    pub contributions: Vec<PoContribution>,
}

/// Mean of the indirect entries, 0 when there are none.
pub fn indirect_mean(entries: &[IndirectAttainmentEntry]) -> f64 {
    if entries.is_empty() {
        return 0.0;
    }
    entries.iter().map(|e| e.value_pct).sum::<f64>() / entries.len() as f64
}

/// Roll CO results up into a PO.
///
/// Mappings with a strength outside 1..=3, or to a CO missing from
/// `co_results`, are skipped with a warning.
pub fn compute_po_attainment(
    po: &ProgramOutcome,
    mappings: &[CoPoMapping],
    co_results: &BTreeMap<String, CoAttainment>,
    indirect: &[IndirectAttainmentEntry],
    policy: &AttainmentPolicy,
) -> PoAttainment {
    let mut contributions = Vec::new();
    for mapping in mappings.iter().filter(|m| m.po_id == po.id) {
        if !STRENGTH_RANGE.contains(&mapping.strength) {
            tracing::warn!(
                po = %po.code,
                co = %mapping.co_id,
                strength = mapping.strength,
                "CO-PO strength outside 1..=3, skipping"
            );
            continue;
        }
        let Some(co) = co_results.get(&mapping.co_id) else {
            tracing::warn!(po = %po.code, co = %mapping.co_id, "mapped CO not found, skipping");
            continue;
        };
        contributions.push(PoContribution {
            co_id: co.co_id.clone(),
            co_code: co.code.clone(),
            strength: mapping.strength,
            co_attainment: co.actual_attainment,
            co_status: co.status,
        });
    }

    let indirect_attainment = round2(indirect_mean(indirect));
    let direct_weight = policy.direct_weight;

    if contributions.is_empty() {
        return PoAttainment {
            po_id: po.id.clone(),
            code: po.code.clone(),
            title: po.title.clone(),
            kind: po.kind,
            target_attainment: po.target_attainment,
            direct_attainment: 0.0,
            indirect_attainment,
            indirect_responses: indirect.len(),
            total_attainment: 0.0,
            direct_weight,
            attained: false,
            status: AttainmentStatus::NoMappings,
            contributions,
        };
    }

    let strength_sum: f64 = contributions.iter().map(|c| f64::from(c.strength)).sum();
    let weighted: f64 = contributions
        .iter()
        .map(|c| c.co_attainment * f64::from(c.strength))
        .sum();
    let direct = weighted / strength_sum;
    let total = direct_weight * direct + policy.indirect_weight() * indirect_mean(indirect);
    let total = round2(total);

    PoAttainment {
        po_id: po.id.clone(),
        code: po.code.clone(),
        title: po.title.clone(),
        kind: po.kind,
        target_attainment: po.target_attainment,
        direct_attainment: round2(direct),
        indirect_attainment,
        indirect_responses: indirect.len(),
        total_attainment: total,
        direct_weight,
        attained: total >= po.target_attainment,
        status: AttainmentStatus::Ok,
        contributions,
    }
}
