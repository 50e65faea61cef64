//! Top-k recommendation assembly from the value table and mastery state.

use chrono::Utc;
use learn_core::action::{Action, ActionKind, TimeFocus};
use learn_core::types::{LearnerState, Recommendation, RecommendationSet};
use learn_mastery::MasteryTracker;
use learn_policy::PolicyAgent;

/// Action kinds whose recommendations cite weak-skill remediation.
fn targets_remediation(kind: ActionKind) -> bool {
    matches!(
        kind,
        ActionKind::ReviewMaterial | ActionKind::PracticeExercise | ActionKind::SeekHelp
    )
}

/// Resolve an action to a concrete content item: the temporal focus picks
/// the module relative to the learner's current one.
fn content_ref(module_index: u16, action: Action) -> String {
    let module = match action.focus {
        TimeFocus::Past => module_index.saturating_sub(1),
        TimeFocus::Present => module_index,
        TimeFocus::Future => module_index.saturating_add(1),
    };
    format!("module-{module}/{}", action.kind.label())
}

/// Rank the full catalog by estimated value for a state and keep the top
/// k. Unseen actions rank at 0, so a cold state serves the catalog's
/// default progression deterministically.
pub fn build_recommendations(
    agent: &PolicyAgent,
    mastery: &MasteryTracker,
    learner_id: &str,
    context_id: &str,
    state: LearnerState,
    top_k: usize,
) -> RecommendationSet {
    let weak = mastery.weak_skills(learner_id, mastery.weak_threshold());
    let weak_names: Vec<String> = weak.iter().take(3).map(|w| w.skill.clone()).collect();

    let mut ranked: Vec<(Action, f64)> = Action::catalog()
        .into_iter()
        .map(|action| (action, agent.table().get(state, action.index())))
        .collect();
    // Descending value; the catalog's stable index order breaks ties.
    ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.index().cmp(&b.0.index()))
    });

    let items = ranked
        .into_iter()
        .take(top_k.max(1))
        .map(|(action, estimated_value)| {
            let target_skills = if targets_remediation(action.kind) {
                weak_names.clone()
            } else {
                Vec::new()
            };
            let rationale = if !target_skills.is_empty() {
                format!(
                    "reinforces skills currently below target: {}",
                    target_skills.join(", ")
                )
            } else if estimated_value > 0.0 {
                format!("learned value {estimated_value:.2} from observed outcomes in this state")
            } else {
                "default progression; not yet explored in this state".to_string()
            };
            Recommendation {
                action,
                action_label: action.label(),
                content_ref: content_ref(state.module_index, action),
                estimated_value,
                target_skills,
                rationale,
                estimated_minutes: action.kind.estimated_minutes(),
            }
        })
        .collect();

    RecommendationSet {
        learner_id: learner_id.to_string(),
        context_id: context_id.to_string(),
        items,
        generated_at: Utc::now(),
    }
}

/// Default set for a learner with no state yet: the catalog's opening
/// progression with zero estimates.
pub fn cold_start(learner_id: &str, context_id: &str, top_k: usize) -> RecommendationSet {
    let items = Action::catalog()
        .into_iter()
        .take(top_k.max(1))
        .map(|action| Recommendation {
            action,
            action_label: action.label(),
            content_ref: content_ref(0, action),
            estimated_value: 0.0,
            target_skills: Vec::new(),
            rationale: "no telemetry for this learner yet; default progression".to_string(),
            estimated_minutes: action.kind.estimated_minutes(),
        })
        .collect();
    RecommendationSet {
        learner_id: learner_id.to_string(),
        context_id: context_id.to_string(),
        items,
        generated_at: Utc::now(),
    }
}
