//! Unlock Resolver
//!
//! Scenarios unlock in catalog order. The first is always open; each later
//! one opens once its predecessor has a completed record at or above the
//! predecessor's passing score. Resolution stops at the first gap, so the
//! result is always a prefix of the catalog.

use crate::{
    progress::{ProgressRecord, ProgressStore},
    scenario::{Scenario, ScenarioId},
};
use anyhow::Result;
use std::collections::HashMap;

/// Computes the unlocked prefix of `catalog` from a user's records.
pub fn resolve_unlocked(catalog: &[Scenario], records: &[ProgressRecord]) -> Vec<ScenarioId> {
    let by_scenario: HashMap<ScenarioId, &ProgressRecord> = records
        .iter()
        .map(|record| (record.scenario_id, record))
        .collect();

    let mut unlocked = Vec::with_capacity(catalog.len());
    let Some(first) = catalog.first() else {
        return unlocked;
    };
    unlocked.push(first.id);

    for pair in catalog.windows(2) {
        let (previous, next) = (&pair[0], &pair[1]);
        let previous_passed = by_scenario.get(&previous.id).is_some_and(|record| {
            record.completed && record.score >= previous.passing_score
        });
        if !previous_passed {
            break;
        }
        unlocked.push(next.id);
    }
    unlocked
}

/// Unlocked scenarios for a user; anonymous users only get the first one.
pub async fn get_unlocked_scenarios(
    store: &dyn ProgressStore,
    catalog: &[Scenario],
    user_id: Option<&str>,
) -> Result<Vec<ScenarioId>> {
    let records = match user_id {
        Some(user_id) => store.progress_for_user(user_id).await?,
        None => Vec::new(),
    };
    Ok(resolve_unlocked(catalog, &records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::InMemoryProgressStore;
    use crate::scenario::CATALOG;

    fn record(scenario_id: ScenarioId, score: u8, completed: bool) -> ProgressRecord {
        ProgressRecord {
            user_id: "agent-1".to_string(),
            scenario_id,
            score,
            completed,
            passed: score >= 70,
            feedback: String::new(),
            transcript: Vec::new(),
        }
    }

    fn assert_prefix(unlocked: &[ScenarioId]) {
        for (index, id) in unlocked.iter().enumerate() {
            assert_eq!(CATALOG[index].id, *id);
        }
    }

    #[test]
    fn test_first_scenario_always_unlocked() {
        assert_eq!(resolve_unlocked(&CATALOG, &[]), vec![ScenarioId::FlightCancellation]);
        assert!(resolve_unlocked(&[], &[]).is_empty());
    }

    #[test]
    fn test_passing_predecessor_unlocks_next() {
        let records = vec![
            record(ScenarioId::FlightCancellation, 70, true),
            record(ScenarioId::LostBaggage, 88, true),
        ];
        let unlocked = resolve_unlocked(&CATALOG, &records);
        assert_eq!(
            unlocked,
            vec![
                ScenarioId::FlightCancellation,
                ScenarioId::LostBaggage,
                ScenarioId::HotelOverbooking
            ]
        );
        assert_prefix(&unlocked);
    }

    #[test]
    fn test_uses_predecessor_threshold() {
        // Hotel Overbooking needs 75, so 74 does not unlock Billing Dispute.
        let records = vec![
            record(ScenarioId::FlightCancellation, 90, true),
            record(ScenarioId::LostBaggage, 90, true),
            record(ScenarioId::HotelOverbooking, 74, true),
        ];
        assert_eq!(resolve_unlocked(&CATALOG, &records).len(), 3);
    }

    #[test]
    fn test_stops_at_first_gap() {
        let records = vec![
            record(ScenarioId::FlightCancellation, 50, true),
            record(ScenarioId::LostBaggage, 95, true),
            record(ScenarioId::HotelOverbooking, 95, true),
        ];
        let unlocked = resolve_unlocked(&CATALOG, &records);
        assert_eq!(unlocked, vec![ScenarioId::FlightCancellation]);
        assert_prefix(&unlocked);
    }

    #[test]
    fn test_incomplete_record_does_not_unlock() {
        let records = vec![record(ScenarioId::FlightCancellation, 95, false)];
        assert_eq!(resolve_unlocked(&CATALOG, &records).len(), 1);
    }

    #[tokio::test]
    async fn test_anonymous_user_gets_first_scenario_only() {
        let store = InMemoryProgressStore::new();
        store
            .record_completion(record(ScenarioId::FlightCancellation, 99, true), 0)
            .await
            .unwrap();

        let anonymous = get_unlocked_scenarios(&store, &CATALOG, None).await.unwrap();
        assert_eq!(anonymous, vec![ScenarioId::FlightCancellation]);

        let known = get_unlocked_scenarios(&store, &CATALOG, Some("agent-1"))
            .await
            .unwrap();
        assert_eq!(known.len(), 2);
    }
}
