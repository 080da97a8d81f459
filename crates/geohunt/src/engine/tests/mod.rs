//! Tests for the engine module.

use std::sync::Arc;

pub(super) fn point(lon_deg: f64, lat_deg: f64) -> crate::geometry::GeoPoint {
    crate::geometry::GeoPoint { lon_deg, lat_deg }
}

pub(super) fn square_zone(zone_id: &str) -> crate::models::Zone {
    crate::models::Zone {
        zone_id: zone_id.to_string(),
        name: format!("{zone_id} district"),
        boundary: vec![
            point(0.0, 0.0),
            point(10.0, 0.0),
            point(10.0, 10.0),
            point(0.0, 10.0),
        ],
        service_location: "central depot".to_string(),
    }
}

pub(super) fn sample_hunt(hunt_id: &str, zone_id: &str) -> crate::models::Hunt {
    crate::models::Hunt {
        hunt_id: hunt_id.to_string(),
        zone_id: zone_id.to_string(),
        name: format!("{hunt_id} treasure run"),
        location: point(5.0, 5.0),
        start_ms: 1_000,
        end_ms: 1_000_000,
        duration_ms: Some(600_000),
        task_ids: vec![],
    }
}

/// Ranks 1-2 earn 100, ranks 3-5 earn 50, rank 6 and later earn nothing.
pub(super) fn standard_tiers() -> Vec<crate::models::RewardTier> {
    vec![
        crate::models::RewardTier {
            level: 1,
            user_count: 2,
            rewards: 100,
        },
        crate::models::RewardTier {
            level: 2,
            user_count: 3,
            rewards: 50,
        },
    ]
}

pub(super) fn mission_task(
    task_id: &str,
    hunt_id: &str,
    tiers: Vec<crate::models::RewardTier>,
) -> crate::models::HuntTask {
    crate::models::HuntTask {
        task_id: task_id.to_string(),
        hunt_id: hunt_id.to_string(),
        name: format!("{task_id} mission"),
        kind: crate::models::TaskKind::Mission,
        questions: vec![],
        tiers,
    }
}

pub(super) fn quiz_task(
    task_id: &str,
    hunt_id: &str,
    tiers: Vec<crate::models::RewardTier>,
) -> crate::models::HuntTask {
    crate::models::HuntTask {
        task_id: task_id.to_string(),
        hunt_id: hunt_id.to_string(),
        name: format!("{task_id} quiz"),
        kind: crate::models::TaskKind::Quiz,
        questions: (1..=5)
            .map(|index| crate::models::QuizQuestion {
                question_id: format!("q{index}"),
                prompt: format!("question {index}"),
                answer: format!("answer {index}"),
            })
            .collect(),
        tiers,
    }
}

pub(super) fn all_correct_answers() -> Vec<super::QuizAnswer> {
    (1..=5)
        .map(|index| super::QuizAnswer {
            question_id: format!("q{index}"),
            answer: format!("answer {index}"),
        })
        .collect()
}

pub(super) fn failing_answers() -> Vec<super::QuizAnswer> {
    vec![super::QuizAnswer {
        question_id: "q1".to_string(),
        answer: "answer 1".to_string(),
    }]
}

pub(super) fn connected_broker() -> (
    geohunt_broker::InMemoryBroker,
    Arc<geohunt_broker::BrokerConnection>,
) {
    let broker = geohunt_broker::InMemoryBroker::new();
    let connection = Arc::new(geohunt_broker::BrokerConnection::new(Arc::new(
        broker.clone(),
    )));
    connection.connect().expect("connect broker");
    (broker, connection)
}

mod ledger;
mod pipeline;
mod runtime;
