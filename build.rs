use std::process::Command;

fn main() {
    println!("cargo:rustc-env=BUILD_TIMESTAMP={}", build_timestamp());
    println!("cargo:rustc-env=BUILD_GIT_SHA={}", git_revision());

    println!("cargo:rerun-if-env-changed=SOURCE_DATE_EPOCH");
    println!("cargo:rerun-if-changed=.git/HEAD");
}

/// Run a tool and return its trimmed stdout, if it succeeded.
fn capture(program: &str, args: &[&str]) -> Option<String> {
    let out = Command::new(program).args(args).output().ok()?;
    if !out.status.success() {
        return None;
    }
    let text = String::from_utf8(out.stdout).ok()?;
    Some(text.trim().to_string()).filter(|s| !s.is_empty())
}

/// Reproducible builds pin the timestamp through `SOURCE_DATE_EPOCH`.
fn build_timestamp() -> String {
    match std::env::var("SOURCE_DATE_EPOCH") {
        Ok(epoch) => capture("date", &["-u", "-d", &format!("@{epoch}"), "+%Y-%m-%dT%H:%M:%SZ"])
            .unwrap_or(epoch),
        Err(_) => capture("date", &["-u", "+%Y-%m-%dT%H:%M:%SZ"]).unwrap_or_else(|| "unknown".into()),
    }
}

fn git_revision() -> String {
    capture("git", &["describe", "--always", "--dirty", "--abbrev=8"])
        .unwrap_or_else(|| "unknown".into())
}
