use std::path::{Path, PathBuf};

use vkstartup_recipe::{Recipe, TargetOs, FPIC, RECIPE_FILE, SHARED};

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

fn shipped_recipe() -> Recipe {
    Recipe::load(workspace_root().join(RECIPE_FILE)).unwrap()
}

#[test]
fn metadata() {
    let recipe = shipped_recipe();
    assert_eq!(recipe.name, "VkStartup");
    assert_eq!(recipe.version, "0.1");
    assert_eq!(recipe.license.as_deref(), Some("MIT"));
    assert_eq!(recipe.description.as_deref(), Some("Vulkan Startup Package"));
    assert_eq!(recipe.settings, vec!["os", "compiler", "build_type", "arch"]);
}

#[test]
fn exactly_three_pinned_dependencies() {
    let recipe = shipped_recipe();
    let requires: Vec<String> = recipe.requires().iter().map(ToString::to_string).collect();
    assert_eq!(
        requires,
        vec![
            "VkShared/0.1",
            "vulkan-loader/1.3.216.0",
            "vulkan-memory-allocator/3.0.0",
        ]
    );
}

#[test]
fn windows_has_no_fpic() {
    let recipe = shipped_recipe();
    let options = recipe.config_options(TargetOs::Windows).unwrap();
    assert!(!options.contains(FPIC));
    assert_eq!(options.flag(SHARED), Some(false));
}

#[test]
fn other_platforms_default_to_static_pic() {
    let recipe = shipped_recipe();
    for os in [TargetOs::Linux, TargetOs::Macos, TargetOs::FreeBsd] {
        let options = recipe.config_options(os).unwrap();
        assert_eq!(options.flag(SHARED), Some(false));
        assert_eq!(options.flag(FPIC), Some(true));
    }
}

#[test]
fn publishes_one_library() {
    assert_eq!(shipped_recipe().package_info().libs, vec!["VkStartup"]);
}

#[test]
fn packages_artifacts_into_conventional_layout() {
    let recipe = shipped_recipe();
    let source = tempfile::tempdir().unwrap();
    let release = tempfile::tempdir().unwrap();
    let staging = tempfile::tempdir().unwrap();

    let files = [
        source.path().join("VkStartup/Context/Context.h"),
        release.path().join("vkstartup.lib"),
        release.path().join("vkstartup.dll"),
        release.path().join("libvkstartup.dylib"),
        release.path().join("libvkstartup.so"),
        release.path().join("libvkstartup.a"),
        release.path().join("vkstartup.d"),
        release.path().join("deps/libvkstartup-0123abcd.a"),
        release.path().join("deps/libthiserror_impl-deadbeef.so"),
        release.path().join("deps/libthiserror_impl-deadbeef.dylib"),
    ];
    for file in &files {
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(file, b"").unwrap();
    }

    let staged = recipe
        .package(source.path(), release.path(), staging.path())
        .unwrap();

    let out = staging.path();
    assert_eq!(staged.len(), 6);
    assert!(out.join("include/Context/Context.h").is_file());
    assert!(out.join("lib/vkstartup.lib").is_file());
    assert!(out.join("bin/vkstartup.dll").is_file());
    assert!(out.join("lib/libvkstartup.dylib").is_file());
    assert!(out.join("lib/libvkstartup.so").is_file());
    assert!(out.join("lib/libvkstartup.a").is_file());
    assert!(!out.join("lib/vkstartup.d").exists());
    assert!(!out.join("lib/libvkstartup-0123abcd.a").exists());
    assert!(!out.join("lib/libthiserror_impl-deadbeef.so").exists());
    assert!(!out.join("lib/libthiserror_impl-deadbeef.dylib").exists());
}

#[test]
fn repackaging_into_the_workspace_is_stable() {
    let recipe = shipped_recipe();
    let workspace = tempfile::tempdir().unwrap();
    let release = workspace.path().join("target/release");
    let dist = workspace.path().join("dist");
    std::fs::create_dir_all(release.join("deps")).unwrap();
    std::fs::write(release.join("libvkstartup.a"), b"static").unwrap();
    std::fs::write(release.join("deps/libthiserror_impl-deadbeef.so"), b"").unwrap();

    let first = recipe.package(workspace.path(), &release, &dist).unwrap();
    let second = recipe.package(workspace.path(), &release, &dist).unwrap();

    assert_eq!(first, vec![dist.join("lib/libvkstartup.a")]);
    assert_eq!(first, second);
    assert_eq!(std::fs::read(dist.join("lib/libvkstartup.a")).unwrap(), b"static");
}
