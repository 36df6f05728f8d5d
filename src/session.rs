//! Session - composition root for a multi-window run
//!
//! Builds the shared store, the component registry, and one bus per window
//! over an in-process hub, then injects them into each window session.
//! Window 0 owns the generation pipeline: it listens for submitted prompts,
//! calls the generation provider, and broadcasts the assembled app so every
//! window (itself included) mounts it from shared state.

use crate::config::AtelierConfig;
use crate::settings::{JsonFileSettings, SettingsService};
use anyhow::Context;
use atelier_coord::{
    ComponentDefinition, ComponentFactory, ComponentHost, ComponentInstance, ComponentRegistry,
    EventBus, MemoryHub, SharedFactory, SharedStateStore, StateMap,
};
use atelier_gen::{
    build_app_prompt, parse_app_reply, GeneratedApp, GenerationProvider, GenerationRequest,
    HttpTextProvider, HttpTextProviderConfig, OfflineTemplateProvider,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Topic a window publishes when the user submits a prompt.
pub const TOPIC_PROMPT_SUBMITTED: &str = "prompt:submitted";
/// Topic the generating window publishes with the assembled app.
pub const TOPIC_APP_ASSEMBLED: &str = "app:assembled";
/// Topic the generating window publishes when assembly fails.
pub const TOPIC_APP_FAILED: &str = "app:failed";

struct PaletteInstance {
    name: String,
}

impl ComponentInstance for PaletteInstance {
    fn type_name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug)]
struct PaletteFactory {
    definition: ComponentDefinition,
}

impl PaletteFactory {
    fn shared(name: &str) -> SharedFactory {
        Arc::new(Self {
            definition: ComponentDefinition::new(name, format!("built-in {name} element"))
                .with_tag(format!("atelier-{name}")),
        })
    }
}

impl ComponentFactory for PaletteFactory {
    fn definition(&self) -> &ComponentDefinition {
        &self.definition
    }

    fn create(&self) -> atelier_coord::Result<Box<dyn ComponentInstance>> {
        Ok(Box::new(PaletteInstance {
            name: self.definition.name.clone(),
        }))
    }
}

/// Lazily load one palette component module.
async fn load_palette_component(name: String) -> atelier_coord::Result<SharedFactory> {
    // Module fetch stand-in; real hosts resolve a UI module here.
    tokio::time::sleep(Duration::from_millis(10)).await;
    Ok(PaletteFactory::shared(&name))
}

/// Host hook logging each component definition.
struct LoggingHost;

impl ComponentHost for LoggingHost {
    fn define(&self, definition: &ComponentDefinition) -> atelier_coord::Result<()> {
        info!(component = %definition.name, tag = %definition.tag, "component defined with host");
        Ok(())
    }
}

/// Pick the configured provider, falling back to the offline templates when
/// no API key is available.
pub fn build_provider(config: &AtelierConfig) -> anyhow::Result<Arc<dyn GenerationProvider>> {
    if config.generation.offline {
        return Ok(Arc::new(OfflineTemplateProvider));
    }
    match config.api_key() {
        Some(api_key) => {
            let provider = HttpTextProvider::new(HttpTextProviderConfig {
                base_url: config.generation.base_url.clone(),
                api_key,
                model: config.generation.model.clone(),
                timeout_secs: config.generation.timeout_secs,
            })
            .context("configuring generation provider")?;
            Ok(Arc::new(provider))
        }
        None => {
            warn!(
                env = %config.generation.api_key_env,
                "no API key set; using offline templates"
            );
            Ok(Arc::new(OfflineTemplateProvider))
        }
    }
}

/// Assemble one app outside any window session.
pub async fn generate_once(
    config: &AtelierConfig,
    description: &str,
) -> anyhow::Result<GeneratedApp> {
    let provider = build_provider(config)?;
    let request = GenerationRequest::new(build_app_prompt(description))
        .with_model(provider.default_model().to_string());
    let response = provider.generate(request).await?;
    Ok(parse_app_reply(&response.text)?)
}

/// One window of the running session.
pub struct WindowSession {
    /// Window index within the session
    pub index: usize,
    /// This window's bus, joined to the session domain
    pub bus: EventBus,
}

impl WindowSession {
    /// Open a window session over `hub`, wiring its subscriptions.
    ///
    /// `provider` is handed to the single window that owns generation.
    pub fn open(
        index: usize,
        hub: &MemoryHub,
        domain: &str,
        store: SharedStateStore,
        registry: ComponentRegistry,
        provider: Option<Arc<dyn GenerationProvider>>,
    ) -> Self {
        let (link, incoming) = hub.join(domain);
        let bus = EventBus::with_transport(link, incoming);

        // Any window seeing the assembled app writes it to shared state;
        // after the first write the rest are no-ops.
        {
            let store = store.clone();
            bus.subscribe(TOPIC_APP_ASSEMBLED, move |payload: &Value| {
                let mut partial = StateMap::new();
                partial.insert("current_app".to_string(), payload.clone());
                partial.insert("status".to_string(), json!("ready"));
                store.set(partial);
            });
        }
        {
            let store = store.clone();
            bus.subscribe(TOPIC_APP_FAILED, move |payload: &Value| {
                let mut partial = StateMap::new();
                partial.insert("status".to_string(), json!("failed"));
                partial.insert("last_error".to_string(), payload.clone());
                store.set(partial);
            });
        }

        // Mount the current app whenever it changes.
        {
            let registry = registry.clone();
            store.subscribe(Some(&["current_app"]), move |change| {
                let Some(value) = change.snapshot.get("current_app") else {
                    return;
                };
                let app: GeneratedApp = match serde_json::from_value(value.clone()) {
                    Ok(app) => app,
                    Err(e) => {
                        error!(window = index, error = %e, "unmountable app in state");
                        return;
                    }
                };
                let registry = registry.clone();
                tokio::spawn(async move {
                    Self::mount(index, &registry, &app).await;
                });
            });
        }

        if let Some(provider) = provider {
            Self::attach_generator(index, &bus, &store, provider);
        }

        info!(window = index, "window session open");
        Self { index, bus }
    }

    /// Resolve and create every component of `app` for this window.
    async fn mount(window: usize, registry: &ComponentRegistry, app: &GeneratedApp) {
        for component in &app.components {
            let name = component.component_type.clone();
            let loaded = registry
                .ensure(&name, || load_palette_component(name.clone()))
                .await;
            match loaded.and_then(|factory| factory.create()) {
                Ok(instance) => {
                    info!(window, component = instance.type_name(), "component mounted");
                }
                Err(e) => {
                    error!(window, component = %component.component_type, error = %e,
                        "component failed to mount");
                }
            }
        }
        info!(window, app = %app.name, "app mounted");
    }

    /// Wire the generation pipeline into this window.
    ///
    /// Bus callbacks are synchronous, so prompt payloads are queued to a
    /// task that talks to the provider.
    fn attach_generator(
        index: usize,
        bus: &EventBus,
        store: &SharedStateStore,
        provider: Arc<dyn GenerationProvider>,
    ) {
        let (queue, mut pending) = mpsc::unbounded_channel::<String>();

        {
            let store = store.clone();
            bus.subscribe(TOPIC_PROMPT_SUBMITTED, move |payload: &Value| {
                let Some(description) = payload.get("description").and_then(Value::as_str)
                else {
                    warn!("prompt event without description");
                    return;
                };
                let mut partial = StateMap::new();
                partial.insert("status".to_string(), json!("generating"));
                store.set(partial);
                let _ = queue.send(description.to_string());
            });
        }

        let bus = bus.clone();
        tokio::spawn(async move {
            while let Some(description) = pending.recv().await {
                info!(window = index, %description, "assembling app");
                let request = GenerationRequest::new(build_app_prompt(&description))
                    .with_model(provider.default_model().to_string());
                let assembled = match provider.generate(request).await {
                    Ok(response) => parse_app_reply(&response.text),
                    Err(e) => Err(e),
                };
                match assembled {
                    Ok(app) => match serde_json::to_value(&app) {
                        Ok(value) => {
                            bus.publish(TOPIC_APP_ASSEMBLED, value);
                        }
                        Err(e) => {
                            bus.publish(TOPIC_APP_FAILED, json!({"reason": e.to_string()}));
                        }
                    },
                    Err(e) => {
                        warn!(window = index, error = %e, "assembly failed");
                        bus.publish(TOPIC_APP_FAILED, json!({"reason": e.to_string()}));
                    }
                }
            }
        });
    }
}

/// Start a session with `windows` windows and drive it from stdin.
pub async fn run(config: AtelierConfig, windows: usize) -> anyhow::Result<()> {
    anyhow::ensure!(windows >= 1, "a session needs at least one window");

    let settings: Option<Arc<dyn SettingsService>> = match JsonFileSettings::in_config_dir() {
        Ok(s) => Some(Arc::new(s)),
        Err(e) => {
            warn!(error = %e, "settings unavailable; preferences will not persist");
            None
        }
    };

    let mut initial = StateMap::new();
    let theme = settings
        .as_ref()
        .and_then(|s| s.load("theme"))
        .unwrap_or_else(|| json!("light"));
    initial.insert("theme".to_string(), theme);
    initial.insert("status".to_string(), json!("idle"));
    let store = SharedStateStore::new(initial);

    // Persist theme changes; the store itself never touches disk.
    if let Some(settings) = settings {
        store.subscribe(Some(&["theme"]), move |change| {
            if let Some(theme) = change.snapshot.get("theme") {
                if let Err(e) = settings.save("theme", theme.clone()) {
                    warn!(error = %e, "saving theme failed");
                }
            }
        });
    }

    let registry = ComponentRegistry::with_host(Arc::new(LoggingHost));
    let hub = MemoryHub::new();
    let provider = build_provider(&config)?;

    let sessions: Vec<WindowSession> = (0..windows)
        .map(|index| {
            WindowSession::open(
                index,
                &hub,
                &config.session.domain,
                store.clone(),
                registry.clone(),
                (index == 0).then(|| Arc::clone(&provider)),
            )
        })
        .collect();

    // Prompts enter through the last window; assembly happens in window 0;
    // every window mounts the result.
    let entry = sessions.last().expect("at least one window");
    info!(
        windows = sessions.len(),
        entry_window = entry.index,
        "session running; type a prompt, Ctrl-D quits"
    );

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let description = line.trim();
        if description.is_empty() {
            continue;
        }
        entry
            .bus
            .publish(TOPIC_PROMPT_SUBMITTED, json!({"description": description}));
    }

    info!("session closed");
    Ok(())
}
