use super::*;

fn parse(raw: &str) -> Scenario {
    toml::from_str(raw).expect("scenario")
}

async fn run(raw: &str) -> Summary {
    replay(parse(raw), Timings::default(), Routes::default())
        .await
        .expect("replay")
}

fn decisions(summary: &Summary) -> Vec<GateDecision> {
    summary.gate.iter().map(|(_, decision)| *decision).collect()
}

fn navigations(summary: &Summary) -> Vec<String> {
    summary
        .journal
        .navigations
        .iter()
        .map(|(_, path)| path.clone())
        .collect()
}

const FIRST_CLUSTER: &str = r##"
[identity]
latency_ms = 90

[verifier]
latency_ms = 120
reachable = ["pulsar://broker.local:6650", "http://admin.local:8080"]

[[client]]
text = "broker.locl:6650"

[[client]]
text = "broker.local:6650"

[[admin]]
text = "http://admin.local:8080"
keystroke_ms = 40

[cluster]
display_name = "production"
color = "#1f6feb"
failing_attempts = 1
max_attempts = 2
"##;

#[test]
fn omitted_sections_use_defaults() {
    let scenario = parse("[cluster]\ndisplay_name = \"dev\"\n");

    assert_eq!(scenario.identity.latency_ms, 100);
    assert!(!scenario.identity.fails);
    assert!(scenario.directory.clusters.is_empty());
    assert_eq!(scenario.verifier.latency_ms, 80);
    assert!(scenario.client.is_empty());
    assert_eq!(scenario.cluster.max_attempts, 1);
}

#[tokio::test(start_paused = true)]
async fn operator_registers_cluster_after_one_refusal() {
    let summary = run(FIRST_CLUSTER).await;

    assert_eq!(summary.ending, Ending::ClusterCreated);
    assert_eq!(decisions(&summary), vec![GateDecision::ShowContent]);

    let calls: Vec<(&str, String)> = summary
        .journal
        .verify_calls
        .iter()
        .map(|(_, endpoint, url)| (*endpoint, url.clone()))
        .collect();
    assert_eq!(
        calls,
        vec![
            ("client", "pulsar://broker.locl:6650".to_string()),
            ("client", "pulsar://broker.local:6650".to_string()),
            ("admin", "http://admin.local:8080".to_string()),
        ]
    );

    let toasts: Vec<Notification> = summary
        .journal
        .notifications
        .iter()
        .map(|(_, notification)| notification.clone())
        .collect();
    assert_eq!(
        toasts,
        vec![
            Notification::Loading("Creating cluster...".into()),
            Notification::Error(
                "Failed to create cluster: cluster 'production' could not be stored".into()
            ),
            Notification::Loading("Creating cluster...".into()),
            Notification::Success("Cluster created successfully!".into()),
        ]
    );

    assert_eq!(navigations(&summary), vec!["/".to_string()]);
    let created = &summary.journal.created;
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].cluster_info.color, "#1f6feb");
    assert_eq!(created[0].client_connection_settings.service_url, "pulsar://broker.local:6650");
}

#[tokio::test(start_paused = true)]
async fn redirect_home_follows_success_after_delay() {
    let summary = run(FIRST_CLUSTER).await;

    let (success_at, _) = summary
        .journal
        .notifications
        .iter()
        .find(|(_, notification)| matches!(notification, Notification::Success(_)))
        .cloned()
        .expect("success toast");
    let (navigated_at, _) = summary.journal.navigations[0].clone();
    assert!(navigated_at - success_at >= Duration::from_millis(2000));
}

#[tokio::test(start_paused = true)]
async fn slow_failing_identity_shows_busy_then_redirects_to_login() {
    let summary = run("[identity]\nlatency_ms = 400\nfails = true\n").await;

    assert_eq!(summary.ending, Ending::RedirectedToLogin);
    assert_eq!(
        decisions(&summary),
        vec![GateDecision::ShowBusy, GateDecision::Redirecting]
    );
    let busy_at = summary.gate[0].0;
    assert!(busy_at >= Duration::from_millis(150) && busy_at < Duration::from_millis(300));
    assert_eq!(navigations(&summary), vec!["/login".to_string()]);
    assert!(summary.journal.verify_calls.is_empty());
}

#[tokio::test(start_paused = true)]
async fn existing_cluster_skips_the_wizard() {
    let summary = run("[directory]\nclusters = [\"staging\"]\n").await;

    assert_eq!(summary.ending, Ending::SetupBypassed);
    assert_eq!(navigations(&summary), vec!["/".to_string()]);
    assert!(summary.journal.notifications.is_empty());
}

#[tokio::test(start_paused = true)]
async fn administrators_skip_the_wizard() {
    let summary = run("[identity]\nroles = [\"ROLE_ADMIN\"]\n").await;

    assert_eq!(summary.ending, Ending::SetupBypassed);
}

#[tokio::test(start_paused = true)]
async fn unreachable_admin_api_stops_at_second_step() {
    let summary = run(
        r#"
[verifier]
reachable = ["pulsar://broker:6650"]

[[client]]
text = "broker:6650"

[[admin]]
text = "http://admin:8080"

[cluster]
display_name = "never"
"#,
    )
    .await;

    assert_eq!(summary.ending, Ending::StuckAtStep(SetupStep::AdminConnection));
    assert!(summary.journal.created.is_empty());
    assert!(navigations(&summary).is_empty());
}

#[tokio::test(start_paused = true)]
async fn summary_lists_every_event() {
    let summary = run("[directory]\nclusters = [\"staging\"]\n").await;
    let rendered = summary.to_string();

    assert!(rendered.starts_with("ending: SetupBypassed"));
    assert!(rendered.contains("gate      ShowContent"));
    assert!(rendered.contains("navigate  /"));
    assert!(rendered.ends_with("clusters created: 0"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn each_round_waits_for_its_own_verification() {
    let timings = Timings {
        debounce_window: Duration::from_millis(20),
        grace_period: Duration::from_millis(150),
        redirect_delay: Duration::from_millis(10),
    };
    let script = parse(
        r#"
[identity]
latency_ms = 1

[verifier]
latency_ms = 60
reachable = ["pulsar://good:6650", "http://admin:8080"]

[[client]]
text = "bad:6650"
keystroke_ms = 1

[[client]]
text = "good:6650"
keystroke_ms = 1

[[admin]]
text = "http://admin:8080"
keystroke_ms = 1

[cluster]
display_name = "threaded"
"#,
    );

    let summary = replay(script, timings, Routes::default())
        .await
        .expect("replay");

    assert_eq!(summary.ending, Ending::ClusterCreated);
    let client_urls: Vec<&str> = summary
        .journal
        .verify_calls
        .iter()
        .filter(|(_, endpoint, _)| *endpoint == "client")
        .map(|(_, _, url)| url.as_str())
        .collect();
    assert_eq!(client_urls.last(), Some(&"pulsar://good:6650"));
    assert_eq!(
        summary.journal.created[0].client_connection_settings.service_url,
        "pulsar://good:6650"
    );
}
