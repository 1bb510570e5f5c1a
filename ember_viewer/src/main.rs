//! Ember viewer
//!
//! Lit cubes on a textured floor, shadowed by a directional light, under a
//! gradient skybox. The camera orbits the origin.
//!
//! Keys: `Escape` quits, `P` toggles perspective and orthographic views,
//! `Space` pauses the orbit, `L` swings the light.

mod scene;

use std::process::ExitCode;
use std::time::Instant;

use ember_engine::config::ConfigError;
use ember_engine::prelude::*;
use ember_engine::render::WindowError;
use glfw::{Action, Key, WindowEvent};
use thiserror::Error;

const CONFIG_PATH: &str = "config/engine.toml";
const ORBIT_RADIUS: f32 = 9.0;
const ORBIT_SPEED: f32 = std::f32::consts::PI / 8.0;

/// Anything that stops the viewer
#[derive(Error, Debug)]
enum ViewerError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("window: {0}")]
    Window(#[from] WindowError),

    #[error("renderer: {0}")]
    Render(#[from] VulkanError),

    #[error("pipeline '{0}' is not configured")]
    MissingPipeline(&'static str),
}

struct Viewer {
    context: RenderContext,
    window: Window,
    cubes: Vec<(RenderableKey, Vec3)>,
    draw_list: Vec<RenderableKey>,
    light: DirectionalLight,
    orthographic: bool,
    paused: bool,
    orbit_angle: f32,
    last_tick: Instant,
}

impl Viewer {
    fn new(config: &EngineConfig) -> Result<Self, ViewerError> {
        let mut window = Window::new(&config.window)?;
        let mut context = RenderContext::new(&mut window, &config.renderer)?;
        context.set_overlay(Box::new(StatsLogOverlay::default()));

        let default = pipeline(&context, MaterialKind::Default)?;
        let textured = pipeline(&context, MaterialKind::Textured)?;
        let skybox = pipeline(&context, MaterialKind::CubeMap)?;

        let checker = scene::checker(256, 32, [200, 200, 190, 255], [70, 75, 80, 255]);
        let floor_texture = context.create_texture(&checker, 256, 256)?;

        let faces = scene::sky_faces(64, [40, 80, 170], [190, 200, 215]);
        let face_refs = [
            faces[0].as_slice(),
            faces[1].as_slice(),
            faces[2].as_slice(),
            faces[3].as_slice(),
            faces[4].as_slice(),
            faces[5].as_slice(),
        ];
        let sky_texture = context.create_cubemap(64, &face_refs)?;

        let floor = context.add_renderable(RenderableDesc {
            pipeline: textured,
            material: MaterialSpec::Textured { albedo: floor_texture },
            mesh: scene::plane(8.0, 4.0),
            transform: Transform::from_position(Vec3::new(0.0, -0.5, 0.0)),
            casts_shadow: false,
        })?;

        let sky = context.add_renderable(RenderableDesc {
            pipeline: skybox,
            material: MaterialSpec::CubeMap { sky: sky_texture },
            mesh: scene::cube(),
            transform: Transform::default(),
            casts_shadow: false,
        })?;
        context.set_skybox(Some(sky))?;

        let mut cubes = Vec::new();
        for (i, position) in [Vec3::new(0.0, 0.5, 0.0), Vec3::new(-2.5, 0.0, 1.5), Vec3::new(2.0, 0.25, -2.0)]
            .into_iter()
            .enumerate()
        {
            let (pipeline, material) = if i == 0 {
                (textured, MaterialSpec::Textured { albedo: floor_texture })
            } else {
                (default, MaterialSpec::Default)
            };
            let key = context.add_renderable(RenderableDesc {
                pipeline,
                material,
                mesh: scene::cube(),
                transform: Transform::from_position(position),
                casts_shadow: true,
            })?;
            cubes.push((key, position));
        }

        let mut draw_list = vec![floor];
        draw_list.extend(cubes.iter().map(|(key, _)| *key));
        log::info!("Scene ready: {} renderables plus skybox", draw_list.len());

        Ok(Self {
            context,
            window,
            cubes,
            draw_list,
            light: DirectionalLight::default(),
            orthographic: false,
            paused: false,
            orbit_angle: 0.0,
            last_tick: Instant::now(),
        })
    }

    fn handle_events(&mut self) {
        for event in self.window.drain_events() {
            match event {
                WindowEvent::Key(Key::Escape, _, Action::Press, _) => self.window.set_should_close(true),
                WindowEvent::Key(Key::P, _, Action::Press, _) => {
                    self.orthographic = !self.orthographic;
                    log::info!("Projection: {}", if self.orthographic { "orthographic" } else { "perspective" });
                }
                WindowEvent::Key(Key::Space, _, Action::Press, _) => self.paused = !self.paused,
                WindowEvent::Key(Key::L, _, Action::Press, _) => {
                    let d = self.light.direction;
                    self.light.direction = Vec3::new(-d.z, d.y, d.x);
                }
                _ => {}
            }
        }
    }

    fn update(&mut self) -> Result<(), ViewerError> {
        let now = Instant::now();
        let dt = now.duration_since(self.last_tick).as_secs_f32();
        self.last_tick = now;
        if self.paused {
            return Ok(());
        }

        self.orbit_angle += dt * ORBIT_SPEED;
        for (i, (key, position)) in self.cubes.iter().enumerate() {
            let spin = self.orbit_angle * (1.0 + i as f32 * 0.5);
            let transform = Transform::from_position(*position).with_rotation(Vec3::new(0.3, 1.0, 0.1), spin);
            self.context.set_transform(*key, transform)?;
        }
        Ok(())
    }

    fn camera(&self) -> Camera {
        let eye = Point3::new(
            ORBIT_RADIUS * self.orbit_angle.cos(),
            4.0,
            ORBIT_RADIUS * self.orbit_angle.sin(),
        );
        if self.orthographic {
            Camera::orthographic(eye, Point3::origin(), 5.0)
        } else {
            Camera::perspective(eye, Point3::origin())
        }
    }

    fn run(&mut self) -> Result<(), ViewerError> {
        while !self.window.should_close() {
            self.window.poll_events();
            self.handle_events();
            self.update()?;

            let camera = self.camera();
            if let FrameOutcome::Skipped =
                self.context
                    .render_frame(&mut self.window, &camera, &self.light, &self.draw_list)?
            {
                log::debug!("Frame skipped while the swapchain was rebuilt");
            }
        }

        self.context.wait_idle()?;
        log::info!("Viewer closed after {} frames", self.context.frame_number());
        Ok(())
    }
}

fn pipeline(context: &RenderContext, kind: MaterialKind) -> Result<PipelineKey, ViewerError> {
    let name = kind.pipeline_name();
    context.pipeline(name).ok_or(ViewerError::MissingPipeline(name))
}

fn main() -> ExitCode {
    let config = match EngineConfig::load_or_default(CONFIG_PATH) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {CONFIG_PATH}: {e}");
            return ExitCode::FAILURE;
        }
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.log_level.as_str())).init();

    if let Err(e) = config.validate() {
        log::error!("Invalid configuration: {}", e);
        return ExitCode::FAILURE;
    }

    match Viewer::new(&config).and_then(|mut viewer| viewer.run()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
