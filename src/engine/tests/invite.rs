use super::*;

async fn mark_invited(
    engine: &BulkEngine,
    account: &AccountId,
    ids: impl IntoIterator<Item = i64>,
) {
    let invited = ids
        .into_iter()
        .map(|remote_id| InviteRecord {
            remote_id,
            invited_at: chrono::Utc::now(),
        })
        .collect();
    engine
        .db
        .commit_invite_batch(
            account,
            &InviteBatchResult {
                invited,
                failed: Vec::new(),
            },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn ten_requested_from_seven_eligible() {
    let (engine, _temp_dir) = create_test_engine().await;
    let account = AccountId::from("acct-1");
    seed_pool(&engine, &account, (1..=7).map(user).collect()).await;
    let client = Arc::new(ScriptedClient::new());
    let sessions = sessions_with(&account, client.clone()).await;

    let summary = engine
        .run_invite(
            &sessions,
            InviteRequest::new(account.clone(), test_channel(), 10),
        )
        .await
        .unwrap();

    assert_eq!(summary.state, JobState::Completed);
    assert_eq!(summary.succeeded, 7);
    assert_eq!(summary.batches_planned, 2);
    let sizes: Vec<usize> = client.invite_calls().iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![5, 2]);
    assert_eq!(client.admin_checks(), 1);
    assert_eq!(engine.db.count_invited(&account).await.unwrap(), 7);
}

#[tokio::test]
async fn never_reinvites_a_user() {
    let (engine, _temp_dir) = create_test_engine().await;
    let account = AccountId::from("acct-1");
    seed_pool(&engine, &account, (1..=10).map(user).collect()).await;
    mark_invited(&engine, &account, 1..=4).await;
    let client = Arc::new(ScriptedClient::new());
    let sessions = sessions_with(&account, client.clone()).await;

    let summary = engine
        .run_invite(
            &sessions,
            InviteRequest::new(account.clone(), test_channel(), 10),
        )
        .await
        .unwrap();

    assert_eq!(summary.succeeded, 6);
    let mut submitted: Vec<i64> = client.invite_calls().into_iter().flatten().collect();
    submitted.sort_unstable();
    assert_eq!(submitted, (5..=10).collect::<Vec<i64>>());

    // a follow-up request has nobody left
    let again = engine
        .run_invite(
            &sessions,
            InviteRequest::new(account.clone(), test_channel(), 3),
        )
        .await
        .unwrap();
    assert_eq!(again.state, JobState::Idle);
    assert_eq!(client.invite_calls().len(), 2);
}

#[tokio::test]
async fn subset_size_matches_request() {
    let (engine, _temp_dir) = create_test_engine().await;
    let account = AccountId::from("acct-1");
    seed_pool(&engine, &account, (1..=40).map(user).collect()).await;
    let client = Arc::new(ScriptedClient::new());
    let sessions = sessions_with(&account, client.clone()).await;

    let summary = engine
        .run_invite(
            &sessions,
            InviteRequest::new(account.clone(), test_channel(), 12),
        )
        .await
        .unwrap();

    assert_eq!(summary.succeeded, 12);
    let sizes: Vec<usize> = client.invite_calls().iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![5, 5, 2]);
    let submitted: std::collections::HashSet<i64> =
        client.invite_calls().into_iter().flatten().collect();
    assert_eq!(submitted.len(), 12);
}

#[tokio::test]
async fn not_admin_aborts_before_any_batch() {
    let (engine, _temp_dir) = create_test_engine().await;
    let account = AccountId::from("acct-1");
    seed_pool(&engine, &account, (1..=7).map(user).collect()).await;
    let client = Arc::new(ScriptedClient::new());
    client.set_admin(Ok(false));
    let sessions = sessions_with(&account, client.clone()).await;

    let summary = engine
        .run_invite(
            &sessions,
            InviteRequest::new(account.clone(), test_channel(), 5),
        )
        .await
        .unwrap();

    assert_eq!(summary.state, JobState::Aborted);
    assert_eq!(summary.abort_reason, Some(AbortReason::NotAdmin));
    assert!(client.invite_calls().is_empty());
    assert_eq!(engine.db.count_invited(&account).await.unwrap(), 0);
    assert_eq!(
        engine.job_state(&account, OperationKind::Invite).await.unwrap(),
        JobState::Aborted
    );
}

#[tokio::test]
async fn admin_check_errors_are_classified() {
    let cases = [
        (
            RemoteError::network("timeout"),
            AbortReason::ChannelUnresolved("timeout".to_string()),
        ),
        (
            RemoteError::session_invalid("logged out"),
            AbortReason::SessionInvalid("logged out".to_string()),
        ),
    ];

    for (error, expected) in cases {
        let (engine, _temp_dir) = create_test_engine().await;
        let account = AccountId::from("acct-1");
        seed_pool(&engine, &account, (1..=3).map(user).collect()).await;
        let client = Arc::new(ScriptedClient::new());
        client.set_admin(Err(error));
        let sessions = sessions_with(&account, client.clone()).await;

        let summary = engine
            .run_invite(&sessions, InviteRequest::new(account, test_channel(), 3))
            .await
            .unwrap();
        assert_eq!(summary.abort_reason, Some(expected));
        assert!(client.invite_calls().is_empty());
    }
}

#[tokio::test]
async fn missing_channel_aborts_without_admin_check() {
    let (engine, _temp_dir) = create_test_engine().await;
    let account = AccountId::from("acct-1");
    seed_pool(&engine, &account, (1..=3).map(user).collect()).await;
    let client = Arc::new(ScriptedClient::new());
    let sessions = sessions_with(&account, client.clone()).await;

    let summary = engine
        .run_invite(
            &sessions,
            InviteRequest {
                account,
                channel: None,
                count: 3,
            },
        )
        .await
        .unwrap();

    assert!(matches!(
        summary.abort_reason,
        Some(AbortReason::ChannelUnresolved(_))
    ));
    assert_eq!(client.admin_checks(), 0);
}

#[tokio::test]
async fn zero_count_is_rejected() {
    let (engine, _temp_dir) = create_test_engine().await;
    let account = AccountId::from("acct-1");

    let err = engine
        .run_invite(
            &SessionRegistry::new(),
            InviteRequest::new(account.clone(), test_channel(), 0),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Job(JobError::InvalidRequest(_))));
    assert!(!engine.is_running(&account));
}

#[tokio::test]
async fn users_without_token_are_skipped_and_recorded() {
    let (engine, _temp_dir) = create_test_engine().await;
    let account = AccountId::from("acct-1");
    seed_pool(
        &engine,
        &account,
        vec![
            user_without_token(1),
            user_without_token(2),
            user(3),
            user(4),
            user(5),
        ],
    )
    .await;
    let client = Arc::new(ScriptedClient::new());
    let sessions = sessions_with(&account, client.clone()).await;

    let summary = engine
        .run_invite(
            &sessions,
            InviteRequest::new(account.clone(), test_channel(), 5),
        )
        .await
        .unwrap();

    assert_eq!(summary.state, JobState::Completed);
    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.failed, 2);
    assert_eq!(client.invite_calls(), vec![vec![3, 4, 5]]);

    let failed = engine.db.list_failed_invites(&account).await.unwrap();
    let mut ids: Vec<i64> = failed.iter().map(|f| f.item.remote_id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2]);
    assert!(
        failed
            .iter()
            .all(|f| f.reason == FailureReason::MissingAccessToken)
    );
}

#[tokio::test]
async fn privacy_rejected_batch_does_not_stop_the_job() {
    let (engine, _temp_dir) = create_test_engine().await;
    let account = AccountId::from("acct-1");
    seed_pool(&engine, &account, (1..=7).map(user).collect()).await;
    let client = Arc::new(ScriptedClient::new());
    client.push_invite(RemoteOutcome::Rejected(RejectReason::PrivacyRestricted));
    let sessions = sessions_with(&account, client.clone()).await;

    let summary = engine
        .run_invite(
            &sessions,
            InviteRequest::new(account.clone(), test_channel(), 7),
        )
        .await
        .unwrap();

    assert_eq!(summary.state, JobState::Completed);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 5);
    assert_eq!(engine.db.count_invited(&account).await.unwrap(), 2);
    assert_eq!(engine.db.count_failed_invites(&account).await.unwrap(), 5);
}

#[tokio::test]
async fn channel_lost_mid_job_aborts() {
    let (engine, _temp_dir) = create_test_engine().await;
    let account = AccountId::from("acct-1");
    seed_pool(&engine, &account, (1..=15).map(user).collect()).await;
    let client = Arc::new(ScriptedClient::new());
    for _ in 0..3 {
        client.push_invite(RemoteOutcome::Error(RemoteError::new(
            RemoteErrorKind::ChannelInvalid,
            "channel deleted",
        )));
    }
    let sessions = sessions_with(&account, client.clone()).await;

    let summary = engine
        .run_invite(
            &sessions,
            InviteRequest::new(account.clone(), test_channel(), 15),
        )
        .await
        .unwrap();

    assert_eq!(summary.state, JobState::Aborted);
    assert_eq!(
        summary.abort_reason,
        Some(AbortReason::ChannelUnresolved("channel deleted".to_string()))
    );
    assert_eq!(summary.batches_planned, 3);
    assert_eq!(client.invite_calls().len(), 1);
    assert_eq!(engine.db.count_invited(&account).await.unwrap(), 0);
    assert_eq!(engine.db.count_failed_invites(&account).await.unwrap(), 0);
    assert_eq!(
        engine
            .job_state(&account, OperationKind::Invite)
            .await
            .unwrap(),
        JobState::Aborted
    );
}

#[tokio::test]
async fn failed_invites_are_retried_and_cleared() {
    let (engine, _temp_dir) = create_test_engine().await;
    let account = AccountId::from("acct-1");
    seed_pool(&engine, &account, (1..=3).map(user).collect()).await;
    let client = Arc::new(ScriptedClient::new());
    client.push_invite(RemoteOutcome::Error(RemoteError::network("reset")));
    let sessions = sessions_with(&account, client.clone()).await;

    let first = engine
        .run_invite(
            &sessions,
            InviteRequest::new(account.clone(), test_channel(), 3),
        )
        .await
        .unwrap();
    assert_eq!(first.state, JobState::Completed);
    assert_eq!(first.failed, 3);
    assert_eq!(engine.db.count_failed_invites(&account).await.unwrap(), 3);

    let second = engine
        .run_invite(
            &sessions,
            InviteRequest::new(account.clone(), test_channel(), 3),
        )
        .await
        .unwrap();
    assert_eq!(second.succeeded, 3);
    assert_eq!(engine.db.count_invited(&account).await.unwrap(), 3);
    assert_eq!(engine.db.count_failed_invites(&account).await.unwrap(), 0);
}

#[tokio::test]
async fn import_then_invite_uses_created_users() {
    let (engine, _temp_dir) = create_test_engine().await;
    let account = AccountId::from("acct-1");
    let items = contacts(8);
    let client = Arc::new(ScriptedClient::new().withholding_tokens([items[0].phone.clone()]));
    let sessions = sessions_with(&account, client.clone()).await;

    engine
        .run_import(&sessions, ImportRequest::new(account.clone(), items))
        .await
        .unwrap();
    let summary = engine
        .run_invite(
            &sessions,
            InviteRequest::new(account.clone(), test_channel(), 8),
        )
        .await
        .unwrap();

    assert_eq!(summary.succeeded, 7);
    assert_eq!(summary.failed, 1);
    let failed = engine.db.list_failed_invites(&account).await.unwrap();
    assert_eq!(failed[0].reason, FailureReason::MissingAccessToken);
}
