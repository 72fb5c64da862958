use std::ffi::OsStr;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn bundled_style() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("styles")
        .join("default.rhai")
}

fn write_script(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::with_suffix(".rhai").unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

fn run_tagxform(input: &Path, args: &[&OsStr]) -> Output {
    let output_file = tempfile::NamedTempFile::with_suffix(".jsonl").unwrap();
    Command::new(env!("CARGO_BIN_EXE_tagxform"))
        .arg("--input")
        .arg(input)
        .arg("--output")
        .arg(output_file.path())
        .args(args)
        .env_remove("TAGXFORM_SCRIPT_PATH")
        .env_remove("TAGXFORM_EXTRA_ATTRIBUTES")
        .output()
        .expect("run tagxform")
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

const MISSING_INPUT: &str = "does/not/exist.osm.pbf";

#[test]
fn missing_entry_point_fails_before_reading_input() {
    let script = write_script(
        r#"
fn filter_tags_node(tags, n) { [false, tags] }
fn filter_tags_way(tags, n) { [false, tags, 0, 0] }
fn filter_basic_tags_rel(tags, n) { [false, tags] }
"#,
    );

    let output = run_tagxform(
        Path::new(MISSING_INPUT),
        &[OsStr::new("--script"), script.path().as_os_str()],
    );

    assert!(!output.status.success());
    let stderr = stderr_of(&output);
    assert!(
        stderr.contains("does not contain a function filter_tags_relation_member"),
        "{stderr}"
    );
    assert!(!stderr.contains("Failed to open"), "{stderr}");
}

#[test]
fn syntax_error_is_reported_as_style_error() {
    let script = write_script("fn filter_tags_node(tags, n) { [false, tags ");

    let output = run_tagxform(
        Path::new(MISSING_INPUT),
        &[OsStr::new("--script"), script.path().as_os_str()],
    );

    assert!(!output.status.success());
    let stderr = stderr_of(&output);
    assert!(stderr.contains("Tag transform style error"), "{stderr}");
}

#[test]
fn failing_top_level_code_is_a_load_error() {
    let script = write_script(r#"throw "refusing to load";"#);

    let output = run_tagxform(
        Path::new(MISSING_INPUT),
        &[OsStr::new("--script"), script.path().as_os_str()],
    );

    assert!(!output.status.success());
    let stderr = stderr_of(&output);
    assert!(stderr.contains("refusing to load"), "{stderr}");
}

#[test]
fn valid_style_proceeds_to_the_input() {
    let style = bundled_style();

    let output = run_tagxform(
        Path::new(MISSING_INPUT),
        &[OsStr::new("--script"), style.as_os_str()],
    );

    assert!(!output.status.success());
    let stderr = stderr_of(&output);
    assert!(!stderr.contains("Tag transform style"), "{stderr}");
    assert!(stderr.contains("Failed to open"), "{stderr}");
}

#[test]
fn config_file_supplies_the_script() {
    let mut config = tempfile::NamedTempFile::with_suffix(".yaml").unwrap();
    writeln!(config, "script_path: {:?}", bundled_style()).unwrap();
    writeln!(config, "extra_attributes: true").unwrap();

    let output = run_tagxform(
        Path::new(MISSING_INPUT),
        &[OsStr::new("--config"), config.path().as_os_str()],
    );

    assert!(!output.status.success());
    let stderr = stderr_of(&output);
    assert!(stderr.contains("Failed to open"), "{stderr}");
}

#[test]
fn config_without_script_is_rejected() {
    let mut config = tempfile::NamedTempFile::with_suffix(".yaml").unwrap();
    writeln!(config, "extra_attributes: true").unwrap();

    let output = run_tagxform(
        Path::new(MISSING_INPUT),
        &[OsStr::new("--config"), config.path().as_os_str()],
    );

    assert!(!output.status.success());
    let stderr = stderr_of(&output);
    assert!(stderr.contains("script_path"), "{stderr}");
}
