use std::env;
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-env-changed=CYPACK_GIT_COMMIT");
    let version = env::var("CARGO_PKG_VERSION").unwrap_or_default();

    if let Ok(v) = env::var("CYPACK_GIT_COMMIT") {
        let v = v.trim();
        if !v.is_empty() {
            println!("cargo:rustc-env=CYPACK_BUILD_VERSION={version} ({v})");
            return;
        }
    }

    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");

    let Some(mut commit) = git_commit() else {
        println!("cargo:rustc-env=CYPACK_BUILD_VERSION={version}");
        return;
    };
    if git_dirty().unwrap_or(false) {
        commit.push_str("-dirty");
    }
    println!("cargo:rustc-env=CYPACK_BUILD_VERSION={version} ({commit})");
}

fn git_commit() -> Option<String> {
    let out = Command::new("git")
        .args(["rev-parse", "--short=12", "HEAD"])
        .output()
        .ok()?;
    if !out.status.success() {
        return None;
    }
    let s = String::from_utf8_lossy(&out.stdout).trim().to_string();
    if s.is_empty() { None } else { Some(s) }
}

fn git_dirty() -> Option<bool> {
    let status = Command::new("git")
        .args(["status", "--porcelain", "--untracked-files=no"])
        .output()
        .ok()?;
    if !status.status.success() {
        return None;
    }
    Some(!status.stdout.is_empty())
}
