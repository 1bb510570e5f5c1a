// build.rs
// Compiles the GLSL sources in resources/shaders to SPIR-V under target/shaders

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

const STAGES: [&str; 6] = ["vert", "frag", "comp", "geom", "tesc", "tese"];

/// `main.vert` -> `main.vert.spv`, so stages sharing a stem do not collide
fn output_path(source: &Path, target_dir: &Path) -> Option<PathBuf> {
    let name = source.file_name()?.to_str()?;
    Some(target_dir.join(format!("{name}.spv")))
}

fn is_stale(source: &Path, output: &Path) -> bool {
    match (std::fs::metadata(source), std::fs::metadata(output)) {
        (Ok(src), Ok(dst)) => match (src.modified(), dst.modified()) {
            (Ok(src_time), Ok(dst_time)) => src_time > dst_time,
            _ => true,
        },
        _ => true,
    }
}

fn compile_shaders(shader_dir: &Path, target_dir: &Path, glslc: &str) -> usize {
    let entries = match std::fs::read_dir(shader_dir) {
        Ok(entries) => entries,
        Err(_) => {
            eprintln!("info: No shader directory found at: {:?}", shader_dir);
            return 0;
        }
    };

    let mut compiled = 0;
    for entry in entries {
        let path = match entry {
            Ok(e) => e.path(),
            Err(e) => {
                eprintln!("warning: Error reading shader directory entry: {}", e);
                continue;
            }
        };

        if path.is_dir() {
            compiled += compile_shaders(&path, target_dir, glslc);
            continue;
        }

        let is_stage = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| STAGES.contains(&ext));
        if !is_stage {
            continue;
        }

        let Some(out_file) = output_path(&path, target_dir) else {
            continue;
        };
        if !is_stale(&path, &out_file) {
            continue;
        }

        let status = Command::new(glslc)
            .arg("-I")
            .arg(shader_dir)
            .arg(&path)
            .arg("-o")
            .arg(&out_file)
            .status();

        match status {
            Ok(s) if s.success() => {
                eprintln!("info: Compiled {:?} -> {:?}", path, out_file);
                compiled += 1;
            }
            Ok(s) => panic!("glslc failed for {:?} with exit code {}", path, s.code().unwrap_or(-1)),
            Err(e) => panic!("Failed to run glslc for {:?}: {}", path, e),
        }
    }
    compiled
}

fn main() {
    println!("cargo:rerun-if-changed=../resources/shaders");
    println!("cargo:rerun-if-env-changed=VULKAN_SDK");
    println!("cargo:rerun-if-env-changed=SKIP_SHADERS");

    if env::var("SKIP_SHADERS").is_ok() {
        eprintln!("info: Skipping shader compilation (SKIP_SHADERS set)");
        return;
    }

    let Ok(vulkan_sdk) = env::var("VULKAN_SDK") else {
        eprintln!("warning: VULKAN_SDK not set, shader compilation skipped");
        eprintln!("hint: Install Vulkan SDK and set VULKAN_SDK environment variable");
        return;
    };

    let glslc = if cfg!(target_os = "windows") {
        format!("{}\\Bin\\glslc.exe", vulkan_sdk)
    } else {
        format!("{}/bin/glslc", vulkan_sdk)
    };

    if !Path::new(&glslc).exists() {
        panic!("Shader compiler not found at {glslc}; check the Vulkan SDK install");
    }

    let shader_dir = PathBuf::from("../resources/shaders");
    let target_dir = PathBuf::from("../target/shaders");
    if let Err(e) = std::fs::create_dir_all(&target_dir) {
        eprintln!("warning: Failed to create target directory: {}", e);
        return;
    }

    match compile_shaders(&shader_dir, &target_dir, &glslc) {
        0 => eprintln!("info: All shaders are up to date"),
        n => eprintln!("info: Successfully compiled {} shader(s)", n),
    }
}
