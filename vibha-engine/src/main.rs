use anyhow::Result;
use chrono::Utc;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use vibha::forms;
use vibha::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize structured logging. RUST_LOG overrides the default level.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    // 2. Load the site configuration: an explicit file from the first argument,
    //    otherwise an optional `vibha.toml` plus VIBHA__* overrides.
    let path = std::env::args().nth(1).map(PathBuf::from);
    let config = SiteConfig::load(path.as_deref())?;
    info!("{} v{} in {}", vibha::ENGINE_NAME, vibha::VERSION, config.timezone.name());

    // 3. Create the engine.
    let engine = AdmissionsEngine::new(config);

    // 4. Listen to every event stream.
    spawn_event_listeners(&engine);

    // 5. Mount the demo components.
    register_demo_components(&engine).await?;

    // 6. Run until Ctrl+C.
    engine.run().await?;

    Ok(())
}

/// Spawns one logging task per engine event stream.
fn spawn_event_listeners(engine: &AdmissionsEngine) {
    let mut system_rx = engine.subscribe_system_events();
    tokio::spawn(async move {
        while let Ok(event) = system_rx.recv().await {
            info!("[SYSTEM] => {:?}", event);
        }
    });

    let mut countdown_rx = engine.subscribe_countdown_events();
    tokio::spawn(async move {
        while let Ok(event) = countdown_rx.recv().await {
            match event {
                CountdownEvent::Completed { id, at } => info!("[COUNTDOWN] => {:?} completed at {}", id, at),
                CountdownEvent::Retargeted { id, target } => info!("[COUNTDOWN] => {:?} now ends at {}", id, target),
                // Ticks arrive every clock period.
                CountdownEvent::Tick { .. } => {}
            }
        }
    });

    let mut wizard_rx = engine.subscribe_wizard_events();
    tokio::spawn(async move {
        while let Ok(event) = wizard_rx.recv().await {
            info!("[WIZARD] => {:?}", event);
        }
    });

    let mut rotator_rx = engine.subscribe_rotator_events();
    tokio::spawn(async move {
        while let Ok(event) = rotator_rx.recv().await {
            info!("[ROTATOR] => {:?}", event);
        }
    });
}

/// Mounts configured deadlines, a short demo countdown, a testimonial rotator
/// and a pre-filled admission session that submits in the background.
async fn register_demo_components(engine: &AdmissionsEngine) -> Result<()> {
    let deadlines = engine.mount_configured_deadlines().await;
    if deadlines.is_empty() {
        info!("No deadlines configured.");
    }

    let mut last_second = None;
    let _demo = engine
        .mount_countdown(
            Utc::now() + chrono::Duration::seconds(5),
            move |remaining| {
                if last_second != Some(remaining.seconds) {
                    last_second = Some(remaining.seconds);
                    info!("[DEMO COUNTDOWN] {} ({})", remaining, remaining.urgency);
                }
            },
            || {
                if let Some(headline) = UrgencyLevel::Urgent.headline() {
                    info!("[DEMO COUNTDOWN] Reached zero. {}", headline);
                }
            },
        )
        .await;

    let _testimonials = engine.mount_rotator(3).await?;

    let session = engine.open_wizard(FormSchema::admission()).await;
    let answers: [(&str, &str); 6] = [
        (forms::PARENT_NAME, "Priya Sharma"),
        (forms::PHONE, "+91 98765 43210"),
        (forms::EMAIL, "priya@example.com"),
        (forms::CHILD_NAME, "Aarav"),
        (forms::CHILD_AGE, "4"),
        (forms::GRADE, "lkg"),
    ];
    for (name, value) in answers {
        engine.update_field(session, name, value).await?;
    }
    engine.next_step(session).await?;
    engine.next_step(session).await?;

    let payload = engine
        .with_wizard(session, |wizard| wizard.schema().to_submission(wizard.fields()))
        .await?;
    info!("Submitting {}", payload.to_json()?);

    let submission = engine.submit(session).await?;
    let watcher = engine.clone();
    tokio::spawn(async move {
        if submission.await.is_err() {
            warn!("Demo submission task panicked.");
            return;
        }
        if let Ok(status) = watcher.with_wizard(session, |wizard| wizard.status().clone()).await {
            info!("Demo session finished as {:?}", status);
        }
    });

    let newsletter = engine.clone();
    tokio::spawn(async move {
        match newsletter.subscribe_newsletter("newsletter@example.com").await {
            Ok(receipt) => info!("Newsletter receipt {}", receipt.reference),
            Err(e) => warn!("Newsletter signup failed: {}", e),
        }
    });

    Ok(())
}
