use std::error::Error;
use std::process::{Command, Stdio};

use chrono::Utc;
use webhook_cert_operator::pki::CertificateAuthorityIssuer;

/// Returns true if the given binary is accessible in PATH.
fn tool_available(binary: &str) -> bool {
    Command::new(binary)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok()
}

const TEST_NAMESPACE: &str = "webhook-cert-e2e";
const SECRET_NAME: &str = "webhook-cert-e2e-cert";
const WEBHOOK_NAME: &str = "webhook-cert-e2e";
const DEPLOYMENT_NAME: &str = "webhook-cert-e2e";
const SELECTOR: &str = "app=webhook-cert-e2e";
const DNS_ENDPOINT: &str = "webhook-cert-e2e-svc.webhook-cert-e2e.svc";

// ---------------------------------------------------------------------------
// Certificate lifecycle against a real Kind cluster.
//
// Run with: cargo test --test e2e_kind -- --ignored
// ---------------------------------------------------------------------------

/// End-to-end test of the operator binary:
///
/// 1. Start (or reuse) a Kind cluster.
/// 2. Create a namespace, a Deployment and a MutatingWebhookConfiguration
///    with an empty caBundle.
/// 3. `bootstrap` must write the Secret, publish its CA as the caBundle and
///    stamp the Deployment's pod template.
/// 4. A following `reconcile` must leave the Secret untouched.
/// 5. Replacing the caBundle with a foreign CA must make `reconcile`
///    regenerate.
#[test]
#[ignore]
fn e2e_certificate_lifecycle() -> Result<(), Box<dyn Error>> {
    // ── Prerequisite check ─────────────────────────────────────────────────────
    for tool in &["kind", "kubectl"] {
        if !tool_available(tool) {
            eprintln!("Skipping e2e test: `{tool}` not found in PATH.");
            return Ok(());
        }
    }

    let cluster_name =
        std::env::var("KIND_CLUSTER_NAME").unwrap_or_else(|_| "webhook-cert-e2e".into());
    ensure_kind_cluster(&cluster_name)?;

    let _cleanup = Cleanup;

    run_cmd(
        "kubectl",
        &[
            "create",
            "namespace",
            TEST_NAMESPACE,
            "--dry-run=client",
            "-o",
            "yaml",
        ],
    )
    .and_then(|output| kubectl_apply(&output))?;

    kubectl_apply(&workload_manifest())?;
    kubectl_apply(&webhook_manifest())?;

    // ── Bootstrap ─────────────────────────────────────────────────────────────
    run_operator("bootstrap")?;

    let ca_cert = secret_field("ca\\.cert")?;
    for key in ["ca\\.key", "tls\\.cert", "tls\\.key"] {
        assert!(!secret_field(key)?.is_empty(), "secret is missing {key}");
    }
    assert_eq!(ca_bundle()?, ca_cert, "caBundle must be the stored CA");

    let restarted_at = run_cmd(
        "kubectl",
        &[
            "get",
            "deployment",
            DEPLOYMENT_NAME,
            "-n",
            TEST_NAMESPACE,
            "-o",
            "jsonpath={.spec.template.metadata.annotations.kubectl\\.kubernetes\\.io/restartedAt}",
        ],
    )?;
    assert!(!restarted_at.is_empty(), "deployment was not restarted");

    // ── Steady state ──────────────────────────────────────────────────────────
    let version_before = secret_resource_version()?;
    run_operator("reconcile")?;
    assert_eq!(
        secret_resource_version()?,
        version_before,
        "a consistent bundle must not be rewritten"
    );

    // ── Drift ─────────────────────────────────────────────────────────────────
    let other_ca = CertificateAuthorityIssuer::new("some-other-ca").issue(None, Utc::now())?;
    run_cmd(
        "kubectl",
        &[
            "patch",
            "mutatingwebhookconfiguration",
            WEBHOOK_NAME,
            "--type=json",
            "-p",
            &format!(
                r#"[{{"op":"replace","path":"/webhooks/0/clientConfig/caBundle","value":"{}"}}]"#,
                base64_encode(other_ca.cert_pem().as_bytes())
            ),
        ],
    )?;

    run_operator("reconcile")?;

    let regenerated = secret_field("ca\\.cert")?;
    assert_ne!(regenerated, ca_cert, "drift must produce a new CA");
    assert_eq!(ca_bundle()?, regenerated);

    Ok(())
}

fn run_operator(subcommand: &str) -> Result<String, Box<dyn Error>> {
    run_cmd(
        env!("CARGO_BIN_EXE_webhook-cert-operator"),
        &[
            subcommand,
            "--namespace",
            TEST_NAMESPACE,
            "--secret-name",
            SECRET_NAME,
            "--webhook-name",
            WEBHOOK_NAME,
            "--dns-endpoint",
            DNS_ENDPOINT,
            "--restart-selector",
            SELECTOR,
        ],
    )
}

/// base64 value of one Secret data key, as kubectl returns it
fn secret_field(escaped_key: &str) -> Result<String, Box<dyn Error>> {
    run_cmd(
        "kubectl",
        &[
            "get",
            "secret",
            SECRET_NAME,
            "-n",
            TEST_NAMESPACE,
            "-o",
            &format!("jsonpath={{.data.{escaped_key}}}"),
        ],
    )
}

fn secret_resource_version() -> Result<String, Box<dyn Error>> {
    run_cmd(
        "kubectl",
        &[
            "get",
            "secret",
            SECRET_NAME,
            "-n",
            TEST_NAMESPACE,
            "-o",
            "jsonpath={.metadata.resourceVersion}",
        ],
    )
}

fn ca_bundle() -> Result<String, Box<dyn Error>> {
    run_cmd(
        "kubectl",
        &[
            "get",
            "mutatingwebhookconfiguration",
            WEBHOOK_NAME,
            "-o",
            "jsonpath={.webhooks[0].clientConfig.caBundle}",
        ],
    )
}

fn base64_encode(bytes: &[u8]) -> String {
    use base64::Engine as _;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn workload_manifest() -> String {
    format!(
        r#"apiVersion: apps/v1
kind: Deployment
metadata:
  name: {DEPLOYMENT_NAME}
  namespace: {TEST_NAMESPACE}
  labels:
    app: {DEPLOYMENT_NAME}
spec:
  replicas: 1
  selector:
    matchLabels:
      app: {DEPLOYMENT_NAME}
  template:
    metadata:
      labels:
        app: {DEPLOYMENT_NAME}
    spec:
      containers:
        - name: pause
          image: registry.k8s.io/pause:3.9
"#
    )
}

/// Matches nothing: the object selector label is never set, and failures
/// are ignored, so the cluster keeps working whatever the caBundle holds.
fn webhook_manifest() -> String {
    format!(
        r#"apiVersion: admissionregistration.k8s.io/v1
kind: MutatingWebhookConfiguration
metadata:
  name: {WEBHOOK_NAME}
webhooks:
  - name: {WEBHOOK_NAME}.example.com
    admissionReviewVersions: ["v1"]
    sideEffects: None
    failurePolicy: Ignore
    clientConfig:
      service:
        name: {WEBHOOK_NAME}-svc
        namespace: {TEST_NAMESPACE}
        path: /mutate
    objectSelector:
      matchLabels:
        webhook-cert-e2e/never-set: "true"
    rules:
      - operations: ["CREATE"]
        apiGroups: [""]
        apiVersions: ["v1"]
        resources: ["pods"]
"#
    )
}

/// Deletes everything the test created, even on assertion failure
struct Cleanup;

impl Drop for Cleanup {
    fn drop(&mut self) {
        let _ = run_cmd_quiet(
            "kubectl",
            &[
                "delete",
                "mutatingwebhookconfiguration",
                WEBHOOK_NAME,
                "--ignore-not-found=true",
            ],
        );
        let _ = run_cmd_quiet(
            "kubectl",
            &[
                "delete",
                "namespace",
                TEST_NAMESPACE,
                "--ignore-not-found=true",
            ],
        );
    }
}

fn ensure_kind_cluster(name: &str) -> Result<(), Box<dyn Error>> {
    let clusters = run_cmd("kind", &["get", "clusters"])?;
    if clusters.lines().any(|line| line.trim() == name) {
        return Ok(());
    }
    run_cmd("kind", &["create", "cluster", "--name", name])?;
    Ok(())
}

fn kubectl_apply(manifest: &str) -> Result<(), Box<dyn Error>> {
    run_cmd_with_stdin("kubectl", &["apply", "-f", "-"], manifest)?;
    Ok(())
}

fn run_cmd(program: &str, args: &[&str]) -> Result<String, Box<dyn Error>> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Ok(kubeconfig) = std::env::var("KUBECONFIG") {
        cmd.env("KUBECONFIG", kubeconfig);
    }
    let output = cmd.output()?;
    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!(
            "command failed: {} {:?}\nstdout:\n{}\nstderr:\n{}",
            program, args, stdout, stderr
        )
        .into());
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn run_cmd_with_stdin(program: &str, args: &[&str], input: &str) -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Ok(kubeconfig) = std::env::var("KUBECONFIG") {
        cmd.env("KUBECONFIG", kubeconfig);
    }
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;
    if let Some(mut stdin) = child.stdin.take() {
        use std::io::Write;
        stdin.write_all(input.as_bytes())?;
        stdin.flush()?;
        drop(stdin);
    }
    let output = child.wait_with_output()?;
    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!(
            "command failed: {} {:?}\nstdout:\n{}\nstderr:\n{}",
            program, args, stdout, stderr
        )
        .into());
    }
    Ok(())
}

fn run_cmd_quiet(program: &str, args: &[&str]) -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Ok(kubeconfig) = std::env::var("KUBECONFIG") {
        cmd.env("KUBECONFIG", kubeconfig);
    }
    let _ = cmd.output();
    Ok(())
}
