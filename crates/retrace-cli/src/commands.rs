use anyhow::{Context, bail};
use retrace_core::{
    AccessibilityNode, DeviceInfo, ElementMatcher, ElementSnapshot, SelectorGenerator, StepNamer,
    Workflow, a11y, load_workflow, save_workflow,
};
use retrace_device::{ControlSurface, DeviceAction, DeviceClient, GlobalAction};
use retrace_engine::{
    RecordingConfig, RecordingPoller, RecordingSession, ReplayConfig, ReplayEngine, ReplayEvent,
    ReplayStatus, StepExecutionResult, StepStatus,
};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

pub async fn ping(device: &DeviceClient) -> anyhow::Result<()> {
    device
        .ping()
        .await
        .with_context(|| format!("device at {} did not answer", device.config().base_url))?;
    println!("ok: {}", device.config().base_url);
    Ok(())
}

pub async fn dump(device: &DeviceClient) -> anyhow::Result<()> {
    let state = device
        .fetch_state()
        .await
        .context("failed to fetch device state")?;
    let generator = SelectorGenerator::default();
    for node in &state.a11y_tree {
        print_node(node, 0, &generator);
    }
    Ok(())
}

pub async fn global(device: &DeviceClient, action: GlobalAction) -> anyhow::Result<()> {
    device
        .perform(&DeviceAction::Global(action))
        .await
        .with_context(|| format!("global action '{}' failed", action.as_str()))?;
    println!("ok: {}", action.as_str());
    Ok(())
}

fn print_node(node: &AccessibilityNode, depth: usize, generator: &SelectorGenerator) {
    let primary = generator
        .generate(&ElementSnapshot::from(node))
        .map(|chain| chain.primary().to_string())
        .unwrap_or_else(|| "-".to_string());
    println!(
        "{:indent$}{} [{}] {}",
        "",
        node.simple_class_name(),
        node.bounds,
        primary,
        indent = depth * 2
    );
    for child in &node.children {
        print_node(child, depth + 1, generator);
    }
}

pub fn selectors(element: &Path) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(element)
        .with_context(|| format!("failed to read {}", element.display()))?;
    let value: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not valid JSON", element.display()))?;
    let selectors = SelectorGenerator::default().generate_all(&ElementSnapshot::from_value(&value));
    if selectors.is_empty() {
        bail!("no selector can be generated for {}", element.display());
    }
    for (index, selector) in selectors.iter().enumerate() {
        println!("{}. {}", index + 1, selector);
    }
    Ok(())
}

pub async fn replay(
    device: DeviceClient,
    path: &Path,
    config: ReplayConfig,
) -> anyhow::Result<()> {
    let workflow = load_workflow(path)?;
    let mut engine = ReplayEngine::new(
        device,
        ElementMatcher::default(),
        StepNamer::default(),
        config,
    );

    let handle = engine.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling replay");
            handle.cancel();
        }
    });
    let printer = tokio::spawn(print_progress(engine.subscribe()));

    let outcome = engine.execute_workflow(&workflow).await;
    match &outcome {
        Ok(_) => {
            if let Err(e) = printer.await {
                warn!("progress printer ended abnormally: {}", e);
            }
        }
        Err(_) => printer.abort(),
    }
    let progress = outcome.context("replay did not start")?;

    println!(
        "{}: {} succeeded, {} failed, {} skipped",
        progress.status,
        progress.succeeded(),
        progress.failed(),
        progress.skipped()
    );
    match progress.status {
        ReplayStatus::Completed if progress.failed() == 0 => Ok(()),
        ReplayStatus::Completed => bail!("{} step(s) failed", progress.failed()),
        status => bail!(
            "replay {}{}",
            status,
            progress
                .error
                .as_deref()
                .map(|e| format!(": {}", e))
                .unwrap_or_default()
        ),
    }
}

/// Print each finished step until the run reaches a terminal status.
async fn print_progress(mut events: broadcast::Receiver<ReplayEvent>) {
    loop {
        match events.recv().await {
            Ok(ReplayEvent::StepCompleted(progress)) => {
                if let Some(result) = progress.last_result() {
                    println!("{}", result_line(result, progress.total_steps));
                }
            }
            Ok(ReplayEvent::StatusChanged(progress)) if progress.status.is_terminal() => break,
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!("progress output skipped {} events", missed);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn result_line(result: &StepExecutionResult, total_steps: usize) -> String {
    let mark = match result.status {
        StepStatus::Success => "ok",
        StepStatus::Failed => "FAIL",
        StepStatus::Skipped => "skip",
        StepStatus::Timeout => "TIMEOUT",
    };
    let mut line = format!(
        "[{}/{}] {:<7} {} ({} ms)",
        result.step_index + 1,
        total_steps,
        mark,
        result.step_name,
        result.duration_ms
    );
    if result.fallback_used
        && let Some(selector) = &result.selector_used
    {
        line.push_str(&format!(" via fallback {}", selector));
    }
    if let Some(error) = &result.error {
        line.push_str(&format!(": {}", error));
    }
    line
}

pub async fn record(
    device: DeviceClient,
    out: &Path,
    name: Option<String>,
    config: RecordingConfig,
) -> anyhow::Result<()> {
    let device = Arc::new(device);
    let state = device
        .fetch_state()
        .await
        .context("failed to fetch device state")?;

    let name = name.unwrap_or_else(|| {
        out.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "recording".to_string())
    });
    let mut workflow = Workflow::new(name);
    workflow.device_info = a11y::screen_bounds(&state.a11y_tree).map(|screen| DeviceInfo {
        screen_width: u32::try_from(screen.width()).ok(),
        screen_height: u32::try_from(screen.height()).ok(),
        ..Default::default()
    });

    let session = RecordingSession::new(
        workflow,
        SelectorGenerator::default(),
        StepNamer::default(),
    );
    let poller = RecordingPoller::spawn(Arc::clone(&device), &session, config);
    println!("Recording, press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    poller.stop().await;

    let workflow = session.workflow();
    save_workflow(&workflow, out)?;
    info!(steps = workflow.len(), path = %out.display(), "Recording saved");
    println!("Saved {} step(s) to {}", workflow.len(), out.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use retrace_core::ActionKind;

    fn result(status: StepStatus, error: Option<&str>) -> StepExecutionResult {
        StepExecutionResult {
            step_id: Default::default(),
            step_index: 1,
            step_name: "Tap \"Login\"".to_string(),
            action: ActionKind::Tap,
            status,
            message: None,
            error: error.map(str::to_string),
            duration_ms: 42,
            selector_used: Some("text=\"Login\" (0.75)".to_string()),
            selector_index: Some(1),
            fallback_used: true,
        }
    }

    #[test]
    fn result_line_shows_fallback_and_error() {
        let line = result_line(&result(StepStatus::Failed, Some("boom")), 3);
        assert_eq!(
            line,
            "[2/3] FAIL    Tap \"Login\" (42 ms) via fallback text=\"Login\" (0.75): boom"
        );
    }

    #[test]
    fn result_line_for_success() {
        let mut ok = result(StepStatus::Success, None);
        ok.fallback_used = false;
        assert_eq!(
            result_line(&ok, 3),
            "[2/3] ok      Tap \"Login\" (42 ms)"
        );
    }
}
