#![forbid(unsafe_code)]

mod support;

use rh_client::notices::drain;
use rh_client::{ApiError, FeedHub, Notice, Settlement};
use rh_core::feed::EntityKind;
use rh_core::model::{TaskStatus, TransactionKind, TransactionStatus};
use serde_json::json;
use support::*;

fn reviewing_user() -> rh_core::model::Identity {
    identity(json!({
        "myTasks": [
            {"id": "T1", "platformId": "P1", "platformName": "Partner P1", "rewardAmount": 15000, "status": "reviewing"},
            {"id": "T2", "platformId": "P2", "platformName": "Partner P2", "rewardAmount": 20000, "status": "reviewing"}
        ]
    }))
}

fn set_status(harness: &Harness, task_id: &str, status: TaskStatus, reason: Option<&str>) {
    harness.backend.update_user(|user| {
        if let Some(task) = user.my_tasks.iter_mut().find(|t| t.id == task_id) {
            task.status = status;
            task.reject_reason = reason.map(str::to_string);
        }
    });
}

#[tokio::test]
async fn two_events_for_one_approval_alert_once() {
    let harness = Harness::new(reviewing_user(), sample_catalog());
    let (session, mut notices) = harness.signed_in().await;
    assert!(session.is_listening());

    set_status(&harness, "T1", TaskStatus::Completed, None);
    harness.backend.update_user(|user| {
        user.transactions.insert(
            0,
            transaction("R1", TransactionKind::TaskReward, 15000.0, TransactionStatus::Success),
        )
    });
    harness.publish_for_user(EntityKind::UserTasks, "T1");
    harness.publish_for_user(EntityKind::Transactions, "R1");

    eventually(|| harness.backend.calls("get_user") == 2).await;
    settle_tasks().await;

    assert_eq!(
        drain(&mut notices),
        vec![Notice::RewardReceived {
            task_id: "T1".to_string(),
            platform_name: "Partner P1".to_string(),
            amount: 15000.0
        }]
    );
    let indicators = session.indicators();
    assert!(indicators.unread_missions);
    assert_eq!(indicators.reward_popup.map(|tx| tx.id), Some("R1".to_string()));
}

#[tokio::test]
async fn rejection_alerts_with_reason() {
    let harness = Harness::new(reviewing_user(), sample_catalog());
    let (session, mut notices) = harness.signed_in().await;

    set_status(&harness, "T2", TaskStatus::Rejected, Some("blurry screenshot"));
    harness.publish_for_user(EntityKind::UserTasks, "T2");

    let notice = next_notice(&mut notices).await;
    assert_eq!(notice.to_string(), "Task rejected (Partner P2): blurry screenshot");
    let current = session.identity().expect("identity");
    assert_eq!(current.task("T2").map(|t| t.status), Some(TaskStatus::Rejected));

    harness.publish_for_user(EntityKind::UserTasks, "T2");
    eventually(|| harness.backend.calls("get_user") == 2).await;
    settle_tasks().await;
    assert!(drain(&mut notices).is_empty());
}

#[tokio::test]
async fn resubmitted_task_alerts_on_a_second_rejection() {
    let harness = Harness::new(reviewing_user(), sample_catalog());
    let (session, mut notices) = harness.signed_in().await;

    set_status(&harness, "T2", TaskStatus::Rejected, Some("blurry screenshot"));
    harness.publish_for_user(EntityKind::UserTasks, "T2");
    assert!(matches!(
        next_notice(&mut notices).await,
        Notice::TaskRejected { reason, .. } if reason == "blurry screenshot"
    ));

    let settled = session
        .submit_proof("T2", "https://img.example/retake.png")
        .settled()
        .await;
    assert_eq!(settled, Some(Settlement::Confirmed));
    let current = session.identity().expect("identity");
    assert_eq!(current.task("T2").map(|t| t.status), Some(TaskStatus::Reviewing));

    set_status(&harness, "T2", TaskStatus::Rejected, Some("wrong account"));
    harness.publish_for_user(EntityKind::UserTasks, "T2");
    assert_eq!(
        next_notice(&mut notices).await,
        Notice::TaskRejected {
            task_id: "T2".to_string(),
            platform_name: "Partner P2".to_string(),
            reason: "wrong account".to_string()
        }
    );
}

#[tokio::test]
async fn new_message_is_announced_and_lights_the_dot() {
    let harness = Harness::new(reviewing_user(), sample_catalog());
    let (session, mut notices) = harness.signed_in().await;
    assert!(!session.indicators().unread_messages);

    harness.backend.update_user(|user| {
        user.messages.insert(
            0,
            serde_json::from_value(json!({"id": "m7", "title": "Bonus week"})).expect("message"),
        )
    });
    harness.publish_for_user(EntityKind::Messages, "m7");

    let notice = next_notice(&mut notices).await;
    assert_eq!(notice.to_string(), "New message: Bonus week");
    assert!(session.indicators().unread_messages);
}

#[tokio::test]
async fn failed_withdrawal_alerts_with_refund() {
    let user = identity(json!({
        "transactions": [
            {"id": "W1", "type": "withdraw", "amount": -50000, "date": "2024-05-03T10:00:00", "status": "pending"}
        ]
    }));
    let harness = Harness::new(user, sample_catalog());
    let (_session, mut notices) = harness.signed_in().await;

    harness.backend.update_user(|user| {
        user.transactions[0].status = TransactionStatus::Failed;
        user.balance += 50000.0;
    });
    harness.publish_for_user(EntityKind::Transactions, "W1");

    let notice = next_notice(&mut notices).await;
    assert_eq!(
        notice,
        Notice::WithdrawalFailed {
            transaction_id: "W1".to_string(),
            amount: 50000.0
        }
    );
    assert_eq!(notice.to_string(), "Withdrawal of 50000 failed and was refunded");
}

#[tokio::test]
async fn withdrawal_payout_alerts_only_for_rows_that_were_pending() {
    let user = identity(json!({
        "transactions": [
            {"id": "W1", "type": "withdraw", "amount": -50000, "date": "2024-05-03T10:00:00", "status": "pending"},
            {"id": "W0", "type": "withdraw", "amount": -20000, "date": "2024-05-01T10:00:00", "status": "success"}
        ]
    }));
    let harness = Harness::new(user, sample_catalog());
    let (_session, mut notices) = harness.signed_in().await;

    harness.backend.update_user(|user| {
        user.transactions[0].status = TransactionStatus::Success;
    });
    harness.publish_for_user(EntityKind::Transactions, "W1");

    assert_eq!(
        next_notice(&mut notices).await,
        Notice::WithdrawalSucceeded {
            transaction_id: "W1".to_string(),
            amount: 50000.0
        }
    );

    harness.publish_for_user(EntityKind::Transactions, "W0");
    eventually(|| harness.backend.calls("get_user") == 2).await;
    settle_tasks().await;
    assert!(drain(&mut notices).is_empty());
}

#[tokio::test]
async fn failed_refetch_keeps_current_identity() {
    let harness = Harness::new(reviewing_user(), sample_catalog());
    let (session, mut notices) = harness.signed_in().await;
    let before = session.identity().expect("identity");

    set_status(&harness, "T1", TaskStatus::Completed, None);
    harness
        .backend
        .fail_next("get_user", ApiError::network("socket closed"));
    harness.publish_for_user(EntityKind::UserTasks, "T1");

    eventually(|| harness.backend.calls("get_user") == 1).await;
    settle_tasks().await;
    assert_eq!(session.identity().expect("identity"), before);
    assert!(drain(&mut notices).is_empty());
    assert!(session.is_listening());
}

#[tokio::test]
async fn events_for_other_accounts_are_ignored() {
    let harness = Harness::new(reviewing_user(), sample_catalog());
    let (_session, _notices) = harness.signed_in().await;

    harness.publish(
        EntityKind::UserTasks,
        json!({"id": "T9", "user_id": "someone-else", "status": "completed"}),
    );
    harness.publish(
        EntityKind::Other("platforms".to_string()),
        json!({"id": "P1", "user_id": USER}),
    );
    settle_tasks().await;
    assert_eq!(harness.backend.calls("get_user"), 0);
}

#[tokio::test]
async fn lagging_behind_still_refetches() {
    let harness = Harness::with_feed(reviewing_user(), sample_catalog(), FeedHub::with_capacity(1));
    let (_session, mut notices) = harness.signed_in().await;
    let release = harness.backend.gate("get_user");

    harness.publish_for_user(EntityKind::Messages, "m1");
    eventually(|| harness.backend.calls("get_user") == 1).await;

    set_status(&harness, "T1", TaskStatus::Completed, None);
    for id in ["m2", "m3", "m4"] {
        harness.publish_for_user(EntityKind::Messages, id);
    }
    let _ = release.send(());

    // one refetch for the lag report, one for the event still buffered
    eventually(|| harness.backend.calls("get_user") == 3).await;
    settle_tasks().await;
    assert!(matches!(
        drain(&mut notices).as_slice(),
        [Notice::RewardReceived { task_id, .. }] if task_id == "T1"
    ));
}

#[tokio::test]
async fn logout_stops_listening() {
    let harness = Harness::new(reviewing_user(), sample_catalog());
    let (session, _notices) = harness.signed_in().await;
    assert_eq!(harness.feed.subscriber_count(), 1);

    session.logout().expect("logout");
    settle_tasks().await;
    assert!(!session.is_listening());
    assert_eq!(harness.feed.subscriber_count(), 0);

    harness.publish_for_user(EntityKind::UserTasks, "T1");
    settle_tasks().await;
    assert_eq!(harness.backend.calls("get_user"), 0);
}
