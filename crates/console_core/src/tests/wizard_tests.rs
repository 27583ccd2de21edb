use super::*;

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Mutex,
};

use shared::domain::AccountInfo;
use tokio::time::{sleep, Instant};

use crate::auth::AuthSnapshot;

#[derive(Default)]
struct RecordingNavigator {
    paths: Mutex<Vec<(Instant, String)>>,
}

impl RecordingNavigator {
    fn paths(&self) -> Vec<String> {
        self.paths
            .lock()
            .expect("paths")
            .iter()
            .map(|(_, path)| path.clone())
            .collect()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate_to(&self, path: &str) {
        self.paths
            .lock()
            .expect("paths")
            .push((Instant::now(), path.to_string()));
    }
}

#[derive(Default)]
struct RecordingNotifier {
    notes: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    fn notes(&self) -> Vec<Notification> {
        self.notes.lock().expect("notes").clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.notes.lock().expect("notes").push(notification);
    }
}

#[derive(Default)]
struct ScriptedCreator {
    calls: AtomicUsize,
    fail: AtomicBool,
    created: Mutex<Vec<ClusterCreation>>,
}

#[async_trait]
impl ClusterCreator for ScriptedCreator {
    async fn create_cluster(&self, creation: ClusterCreation) -> Result<(), ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        sleep(Duration::from_millis(30)).await;
        if self.fail.load(Ordering::SeqCst) {
            return Err(ApiError::internal("name already taken"));
        }
        self.created.lock().expect("created").push(creation);
        Ok(())
    }
}

struct Fixture {
    controller: StepController<ClusterSetup>,
    creator: Arc<ScriptedCreator>,
    navigator: Arc<RecordingNavigator>,
    notifier: Arc<RecordingNotifier>,
}

fn fixture() -> Fixture {
    let creator = Arc::new(ScriptedCreator::default());
    let navigator = Arc::new(RecordingNavigator::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let controller =
        StepController::cluster_setup(creator.clone(), navigator.clone(), notifier.clone());
    Fixture {
        controller,
        creator,
        navigator,
        notifier,
    }
}

fn broker() -> ClusterConnectionSettings {
    ClusterConnectionSettings::new("pulsar://broker:6650")
}

fn admin() -> ClusterConnectionSettings {
    ClusterConnectionSettings::new("http://admin:8080")
}

async fn fill_to_last_step(controller: &mut StepController<ClusterSetup>) {
    controller.set_step_value(SetupValue::ClientConnection(Some(broker())));
    assert!(matches!(controller.advance().await, Advance::Moved(2)));
    controller.set_step_value(SetupValue::AdminConnection(Some(admin())));
    assert!(matches!(controller.advance().await, Advance::Moved(3)));
    controller.set_step_value(SetupValue::cluster_info_draft(ClusterInfo::named("prod")));
}

#[tokio::test]
async fn advance_is_disabled_until_client_connection_is_committed() {
    let Fixture { mut controller, .. } = fixture();

    assert_eq!(controller.setup_step(), SetupStep::ClientConnection);
    assert!(!controller.is_advance_enabled());
    assert!(matches!(controller.advance().await, Advance::Blocked));
    assert_eq!(controller.current_step(), 1);

    controller.set_step_value(SetupValue::ClientConnection(Some(broker())));
    assert!(controller.is_advance_enabled());

    // An invalidated connection clears the committed value again.
    controller.set_step_value(SetupValue::ClientConnection(None));
    assert!(!controller.is_advance_enabled());
}

#[tokio::test]
async fn incomplete_cluster_info_blocks_commit() {
    let Fixture {
        mut controller,
        creator,
        ..
    } = fixture();
    fill_to_last_step(&mut controller).await;

    controller.set_step_value(SetupValue::cluster_info_draft(ClusterInfo::named("   ")));
    assert!(!controller.is_advance_enabled());
    assert!(matches!(controller.advance().await, Advance::Blocked));
    assert_eq!(creator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn final_step_creates_cluster_once_and_redirects_home() {
    let Fixture {
        mut controller,
        creator,
        navigator,
        notifier,
    } = fixture();
    fill_to_last_step(&mut controller).await;

    let Advance::Committed(redirect) = controller.advance().await else {
        panic!("commit should succeed");
    };
    let committed_at = Instant::now();
    assert_eq!(controller.phase(), Phase::Committed);
    assert!(!controller.is_advance_enabled());
    assert!(matches!(controller.advance().await, Advance::Blocked));
    assert_eq!(creator.calls.load(Ordering::SeqCst), 1);

    let created = creator.created.lock().expect("created").clone();
    assert_eq!(
        created,
        vec![ClusterCreation {
            cluster_info: ClusterInfo::named("prod"),
            client_connection_settings: broker(),
            admin_connection_settings: admin(),
        }]
    );

    sleep(Duration::from_millis(1999)).await;
    assert!(navigator.paths().is_empty());

    redirect.await.expect("redirect task");
    let (at, path) = navigator.paths.lock().expect("paths")[0].clone();
    assert_eq!(path, "/");
    let waited = at - committed_at;
    assert!(waited >= DEFAULT_REDIRECT_DELAY && waited < DEFAULT_REDIRECT_DELAY + Duration::from_millis(5));

    assert_eq!(
        notifier.notes(),
        vec![
            Notification::Loading("Creating cluster...".into()),
            Notification::Success("Cluster created successfully!".into()),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn failed_creation_can_be_retried() {
    let Fixture {
        mut controller,
        creator,
        navigator,
        notifier,
    } = fixture();
    fill_to_last_step(&mut controller).await;
    creator.fail.store(true, Ordering::SeqCst);

    let Advance::Failed(err) = controller.advance().await else {
        panic!("commit should fail");
    };
    assert!(matches!(err, CommitError::Creation(_)));
    assert_eq!(controller.phase(), Phase::Editing);
    assert_eq!(controller.current_step(), 3);
    assert!(controller.is_advance_enabled());
    assert_eq!(
        notifier.notes().last(),
        Some(&Notification::Error(
            "Failed to create cluster: name already taken".into()
        ))
    );

    sleep(Duration::from_secs(5)).await;
    assert!(navigator.paths().is_empty());
    assert_eq!(creator.calls.load(Ordering::SeqCst), 1);

    creator.fail.store(false, Ordering::SeqCst);
    assert!(matches!(controller.advance().await, Advance::Committed(_)));
    assert_eq!(creator.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn commit_in_progress_refuses_second_submit() {
    let Fixture { mut controller, .. } = fixture();
    fill_to_last_step(&mut controller).await;

    let creation = controller.begin_commit().expect("first commit");
    assert_eq!(creation.cluster_info.display_name, "prod");
    assert_eq!(controller.phase(), Phase::Committing);
    assert!(!controller.is_advance_enabled());
    assert!(!controller.is_retreat_enabled());
    assert!(matches!(
        controller.begin_commit(),
        Err(CommitError::AlreadyCommitting)
    ));

    controller.retreat();
    assert_eq!(controller.current_step(), 3);

    let redirect = controller.complete_commit(Ok(())).expect("completed");
    redirect.abort();
    assert!(matches!(
        controller.begin_commit(),
        Err(CommitError::AlreadyCommitted)
    ));
}

#[tokio::test(start_paused = true)]
async fn completion_without_begin_leaves_phase_untouched() {
    let Fixture {
        mut controller,
        creator,
        navigator,
        notifier,
    } = fixture();
    fill_to_last_step(&mut controller).await;

    assert!(matches!(
        controller.complete_commit(Ok(())),
        Err(CommitError::NotCommitting)
    ));
    assert_eq!(controller.phase(), Phase::Editing);
    sleep(Duration::from_secs(5)).await;
    assert!(navigator.paths().is_empty());
    assert!(notifier.notes().is_empty());
    assert_eq!(creator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn late_failure_after_commit_cannot_reopen_wizard() {
    let Fixture {
        mut controller,
        creator,
        navigator,
        ..
    } = fixture();
    fill_to_last_step(&mut controller).await;

    let Advance::Committed(redirect) = controller.advance().await else {
        panic!("commit should succeed");
    };
    redirect.await.expect("redirect task");

    assert!(matches!(
        controller.complete_commit(Err(ApiError::internal("late"))),
        Err(CommitError::AlreadyCommitted)
    ));
    assert_eq!(controller.phase(), Phase::Committed);
    assert!(!controller.is_advance_enabled());
    assert!(matches!(controller.advance().await, Advance::Blocked));
    assert_eq!(creator.calls.load(Ordering::SeqCst), 1);
    assert_eq!(navigator.paths(), vec!["/".to_string()]);
}

#[tokio::test]
async fn commit_requires_every_step() {
    let Fixture { mut controller, .. } = fixture();
    controller.set_step_value(SetupValue::ClientConnection(Some(broker())));

    assert!(matches!(
        controller.commit().await,
        Err(CommitError::MissingStepValue { step: 2 })
    ));
    assert_eq!(controller.phase(), Phase::Editing);
}

#[tokio::test]
async fn retreat_keeps_committed_values() {
    let Fixture { mut controller, .. } = fixture();

    controller.retreat();
    assert_eq!(controller.current_step(), 1);

    fill_to_last_step(&mut controller).await;
    controller.retreat();
    controller.retreat();
    assert_eq!(controller.setup_step(), SetupStep::ClientConnection);
    assert!(controller.is_advance_enabled());

    let model = controller.model();
    assert_eq!(model.client_connection, Some(broker()));
    assert_eq!(model.admin_connection, Some(admin()));
    assert_eq!(model.cluster_info, Some(ClusterInfo::named("prod")));
}

#[test]
fn connection_steps_carry_their_forms() {
    let client = SetupStep::ClientConnection
        .connection_form()
        .expect("client form");
    assert!(client.is_complete(&broker()));

    let admin_form = SetupStep::AdminConnection
        .connection_form()
        .expect("admin form");
    assert!(admin_form.is_complete(&admin()));
    assert!(!admin_form.is_complete(&broker()));

    assert!(SetupStep::ClusterInfo.connection_form().is_none());
    assert_eq!(SetupStep::from_index(4), None);
}

struct StaticDirectory(Result<Vec<ClusterInfo>, ApiError>);

#[async_trait]
impl ClusterDirectory for StaticDirectory {
    async fn list_cluster_info(&self) -> Result<Vec<ClusterInfo>, ApiError> {
        self.0.clone()
    }
}

fn guard(clusters: Result<Vec<ClusterInfo>, ApiError>) -> (SetupGuard, Arc<RecordingNavigator>) {
    let navigator = Arc::new(RecordingNavigator::default());
    let guard = SetupGuard::new(Arc::new(StaticDirectory(clusters)), navigator.clone());
    (guard, navigator)
}

fn account(roles: &[&str]) -> AuthSnapshot {
    AuthSnapshot::authenticated(AccountInfo {
        username: "alice".into(),
        roles: roles.iter().map(|role| role.to_string()).collect(),
    })
}

#[tokio::test]
async fn guard_bypasses_when_a_cluster_exists() {
    let (guard, navigator) = guard(Ok(vec![ClusterInfo::named("existing")]));
    let (_tx, mut auth) = AuthHandle::channel(account(&[]));

    assert_eq!(
        guard.check(&mut auth).await,
        GuardDecision::Bypass(BypassReason::ClusterExists)
    );
    assert_eq!(navigator.paths(), vec!["/".to_string()]);
}

#[tokio::test]
async fn guard_bypasses_for_administrators() {
    let (guard, navigator) = guard(Ok(Vec::new()));
    let (_tx, mut auth) = AuthHandle::channel(account(&["ROLE_ADMIN"]));

    assert_eq!(
        guard.check(&mut auth).await,
        GuardDecision::Bypass(BypassReason::AdminAccount)
    );
    assert_eq!(navigator.paths(), vec!["/".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn guard_waits_for_identity_and_tolerates_listing_failure() {
    let (guard, navigator) = guard(Err(ApiError::internal("directory down")));
    let (tx, mut auth) = AuthHandle::channel(AuthSnapshot::loading());

    tokio::spawn(async move {
        sleep(Duration::from_millis(300)).await;
        tx.send_replace(account(&["ROLE_USER"]));
    });

    let started = Instant::now();
    assert_eq!(guard.check(&mut auth).await, GuardDecision::Proceed);
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert!(navigator.paths().is_empty());
}
