//! hostlink Server Binary
//!
//! Runs the relay in front of a small in-memory scene that stands in for a
//! real host application. The scene lives on the main thread and is only
//! touched by the host loop.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use clap::Parser;
use hostlink::{scheduler, Config, Dispatcher, HandlerError, Server};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;
use tracing_subscriber::{fmt, EnvFilter};

/// hostlink Server
#[derive(Parser, Debug)]
#[command(name = "hostlink-server")]
#[command(about = "Relay JSON commands onto a single-threaded host loop")]
#[command(version)]
struct Args {
    /// Listen address (host:port)
    #[arg(short, long, default_value = hostlink::config::DEFAULT_ADDR)]
    listen: String,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "64")]
    max_connections: usize,

    /// Host loop tick interval in milliseconds
    #[arg(short, long, default_value = "10")]
    tick_ms: u64,

    /// Close connections that send nothing for this long (0 = never)
    #[arg(short, long, default_value = "0")]
    idle_timeout_ms: u64,
}

// =============================================================================
// Demo Scene
// =============================================================================

/// Objects listed by `get_scene_info`, the rest are only counted
const SCENE_INFO_LIMIT: usize = 10;

#[derive(Debug, Default)]
struct Scene {
    name: String,
    objects: BTreeMap<String, SceneObject>,
    frame: u64,
}

#[derive(Debug, Clone, Serialize)]
struct SceneObject {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    location: [f64; 3],
    rotation: [f64; 3],
    scale: [f64; 3],
    visible: bool,
}

#[derive(Debug, Deserialize)]
struct CreateObject {
    #[serde(rename = "type", default = "default_kind")]
    kind: String,
    name: Option<String>,
    #[serde(default)]
    location: [f64; 3],
    #[serde(default)]
    rotation: [f64; 3],
    #[serde(default = "unit_scale")]
    scale: [f64; 3],
}

#[derive(Debug, Deserialize)]
struct ModifyObject {
    name: String,
    location: Option<[f64; 3]>,
    rotation: Option<[f64; 3]>,
    scale: Option<[f64; 3]>,
    visible: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ObjectName {
    name: String,
}

fn default_kind() -> String {
    "CUBE".to_string()
}

fn unit_scale() -> [f64; 3] {
    [1.0, 1.0, 1.0]
}

impl Scene {
    fn info(&self) -> Value {
        let objects: Vec<Value> = self
            .objects
            .values()
            .take(SCENE_INFO_LIMIT)
            .map(|o| json!({ "name": o.name, "type": o.kind, "location": o.location }))
            .collect();

        json!({
            "name": self.name,
            "object_count": self.objects.len(),
            "objects": objects,
            "frame": self.frame,
        })
    }

    fn create(&mut self, args: CreateObject) -> Result<SceneObject, HandlerError> {
        let name = args.name.unwrap_or_else(|| self.unique_name(&args.kind));
        if self.objects.contains_key(&name) {
            return Err(HandlerError::msg(format!("Object already exists: {name}")));
        }

        let object = SceneObject {
            name: name.clone(),
            kind: args.kind,
            location: args.location,
            rotation: args.rotation,
            scale: args.scale,
            visible: true,
        };
        self.objects.insert(name, object.clone());
        Ok(object)
    }

    fn modify(&mut self, args: ModifyObject) -> Result<SceneObject, HandlerError> {
        let object = self.get_mut(&args.name)?;
        if let Some(location) = args.location {
            object.location = location;
        }
        if let Some(rotation) = args.rotation {
            object.rotation = rotation;
        }
        if let Some(scale) = args.scale {
            object.scale = scale;
        }
        if let Some(visible) = args.visible {
            object.visible = visible;
        }
        Ok(object.clone())
    }

    fn delete(&mut self, name: &str) -> Result<Value, HandlerError> {
        self.objects
            .remove(name)
            .map(|_| json!({ "deleted": name }))
            .ok_or_else(|| not_found(name))
    }

    fn get_mut(&mut self, name: &str) -> Result<&mut SceneObject, HandlerError> {
        self.objects.get_mut(name).ok_or_else(|| not_found(name))
    }

    fn unique_name(&self, kind: &str) -> String {
        let base = kind.to_lowercase();
        (1..)
            .map(|n| format!("{base}.{n:03}"))
            .find(|candidate| !self.objects.contains_key(candidate))
            .unwrap_or(base)
    }
}

fn not_found(name: &str) -> HandlerError {
    HandlerError::msg(format!("Object not found: {name}"))
}

fn build_dispatcher() -> Dispatcher<Scene> {
    Dispatcher::builder()
        .register("ping", |_scene: &mut Scene, _params| Ok(json!("pong")))
        .register("echo", |_scene: &mut Scene, params| Ok(Value::Object(params)))
        .register("get_scene_info", |scene: &mut Scene, _params| Ok(scene.info()))
        .register_typed("create_object", |scene: &mut Scene, args: CreateObject| {
            scene.create(args)
        })
        .register_typed("modify_object", |scene: &mut Scene, args: ModifyObject| {
            scene.modify(args)
        })
        .register_typed("delete_object", |scene: &mut Scene, args: ObjectName| {
            scene.delete(&args.name)
        })
        .register_typed("get_object_info", |scene: &mut Scene, args: ObjectName| {
            scene.get_mut(&args.name).map(|o| o.clone())
        })
        .build()
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hostlink=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("hostlink server v{}", hostlink::VERSION);
    tracing::info!("Listen address: {}", args.listen);

    let config = Config::builder()
        .listen_addr(&args.listen)
        .max_connections(args.max_connections)
        .tick_interval_ms(args.tick_ms)
        .idle_timeout_ms(args.idle_timeout_ms)
        .build();

    if let Err(e) = config.validate() {
        tracing::error!("{}", e);
        std::process::exit(1);
    }

    let dispatcher = build_dispatcher();
    tracing::info!("Registered commands: {}", dispatcher.command_types().join(", "));

    let (scheduler, host_loop) = scheduler::channel();
    let server = Server::new(config.clone(), scheduler, Arc::new(dispatcher));
    if let Err(e) = server.start() {
        tracing::error!("Failed to start server: {}", e);
        std::process::exit(1);
    }

    // The main thread is the host: it owns the scene and runs the loop
    let running = Arc::new(AtomicBool::new(true));
    if let Err(e) = watch_for_shutdown(Arc::clone(&running)) {
        tracing::error!("Failed to install signal handlers: {}", e);
        server.stop();
        std::process::exit(1);
    }

    let mut scene = Scene {
        name: "Scene".to_string(),
        ..Scene::default()
    };
    host_loop.run(&mut scene, config.tick_interval(), &running, |scene| {
        scene.frame += 1;
    });

    server.stop();
    tracing::info!("Shut down after {} frames", scene.frame);
}

/// Clear `running` on the first termination signal
fn watch_for_shutdown(running: Arc<AtomicBool>) -> std::io::Result<()> {
    let mut signals = Signals::new([SIGTERM, SIGINT, SIGQUIT, SIGHUP])?;
    thread::Builder::new()
        .name("hostlink-signals".to_string())
        .spawn(move || {
            if let Some(signal) = signals.forever().next() {
                tracing::info!("Received signal {}, shutting down", signal);
                running.store(false, Ordering::SeqCst);
            }
        })?;
    Ok(())
}
