// README-to-rustdoc helpers shared by every crate's build script.
// Pull in with: include!("../build_common.rs");
//
// The including build.rs must import:
//   use std::env;
//   use std::fs;
//   use std::path::Path;

/// Render `README.md` into `$OUT_DIR/README_GENERATED.md` for `#![doc = include_str!(..)]`.
///
/// Links written for GitHub are rewritten so rustdoc can resolve them:
/// `src/foo.rs` becomes the module `foo`, and links to the workspace README
/// become absolute links to the repository.
fn process_readme_for_rustdoc(crate_dir: &str) {
    println!("cargo:rerun-if-changed=README.md");
    println!("cargo:rerun-if-changed=../../Cargo.toml");

    let out_dir = env::var("OUT_DIR").expect("cargo sets OUT_DIR for build scripts");
    let dest = Path::new(&out_dir).join("README_GENERATED.md");

    let readme = fs::read_to_string(Path::new(crate_dir).join("README.md")).unwrap_or_default();
    let mut rendered = readme.replace("](src/", "](").replace(".rs)", ")");

    if let Some(url) = workspace_repository(crate_dir) {
        rendered = rendered.replace("](../../README.md", &format!("]({url}"));
    }

    fs::write(dest, rendered).expect("README_GENERATED.md is writable");
}

/// `repository = "..."` from the workspace manifest, if present.
fn workspace_repository(crate_dir: &str) -> Option<String> {
    let manifest = Path::new(crate_dir).parent()?.parent()?.join("Cargo.toml");
    let content = fs::read_to_string(manifest).ok()?;

    content
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("repository") && line.contains('='))
        .find_map(|line| {
            let value = line.split_once('=')?.1.trim();
            value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .map(str::to_owned)
        })
}
