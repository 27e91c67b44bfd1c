//! End to end launches.

use std::{ffi::CString, path::Path};

use rstest::rstest;

use crate::{
    ExecReplacer, ForkExecReplacer, LaunchConfig, Launcher, Payload, runtime::error::LaunchError,
};

use super::replacer::RecordingReplacer;
use super::util;

fn config_in<'a>(dir: &Path, payload: &'a str) -> LaunchConfig<'a> {
    LaunchConfig::new(Payload::new(payload)).scratch_dir(dir)
}

/// The staging file holds exactly the original image, owner-only.
#[rstest]
#[case::empty(0)]
#[case::single_byte(1)]
#[case::several_chunks(100_000)]
fn stage_round_trip(#[case] len: usize) {
    let _serial = util::exec_lock();
    let dir = tempfile::tempdir().unwrap();
    let image = util::sample_image(len);
    let encoded = util::encode_payload(&image);
    let launcher = Launcher::new(config_in(dir.path(), &encoded), util::launch_env(&[], &[]));

    let staged = launcher.stage().unwrap();

    assert_eq!(staged.len, len as u64);
    assert!(staged.path.starts_with(dir.path()));
    assert_eq!(std::fs::read(&staged.path).unwrap(), image);
    assert_eq!(util::mode_of(&staged.path), 0o700);
}

/// Only argument zero changes.
#[test]
fn forwards_arguments() {
    let _serial = util::exec_lock();
    let dir = tempfile::tempdir().unwrap();
    let encoded = util::encode_payload(&util::script("exit 0"));
    let launcher = Launcher::new(
        config_in(dir.path(), &encoded),
        util::launch_env(&["anything", "-x", "42"], &[]),
    );
    let recorder = RecordingReplacer::new();

    let Err(err) = launcher.run(&recorder);

    assert!(matches!(err, LaunchError::Exec { .. }));
    let calls = recorder.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].argv, vec!["binary", "-x", "42"]);
    assert!(calls[0].path.starts_with(dir.path()));
}

#[test]
fn custom_placeholder() {
    let _serial = util::exec_lock();
    let dir = tempfile::tempdir().unwrap();
    let encoded = util::encode_payload(&util::script("exit 0"));
    let launcher = Launcher::new(
        config_in(dir.path(), &encoded).placeholder("tool"),
        util::launch_env(&["/opt/launcher"], &[]),
    );
    let recorder = RecordingReplacer::new();

    let _ = launcher.run(&recorder);

    assert_eq!(recorder.calls()[0].argv, vec!["tool"]);
}

/// Every variable of the current process reaches the replacer unchanged.
#[test]
fn forwards_environment() {
    let _serial = util::exec_lock();
    let dir = tempfile::tempdir().unwrap();
    let encoded = util::encode_payload(&util::script("exit 0"));
    let env = crate::LaunchEnv::current();
    let expected: Vec<String> = env
        .env
        .iter()
        .map(|(k, v)| format!("{}={}", k.to_string_lossy(), v.to_string_lossy()))
        .collect();
    let launcher = Launcher::new(config_in(dir.path(), &encoded), env);
    let recorder = RecordingReplacer::new();

    let _ = launcher.run(&recorder);

    assert_eq!(recorder.calls()[0].envp, expected);
}

/// A malformed encoding stops the launch before exec.
#[rstest]
#[case::bad_character("H4sI*AAAAAAAAA")]
#[case::not_base64("!this is not a payload")]
fn corrupt_encoding_is_fatal(#[case] payload: &str) {
    let _serial = util::exec_lock();
    let dir = tempfile::tempdir().unwrap();
    let launcher = Launcher::new(config_in(dir.path(), payload), util::launch_env(&["a"], &[]));
    let recorder = RecordingReplacer::new();

    let Err(err) = launcher.run(&recorder);

    assert!(matches!(err, LaunchError::Decode(_)), "{err}");
    assert!(recorder.calls().is_empty());
}

/// A truncated compressed stream is caught, and the partial file stays.
#[test]
fn truncated_stream_is_fatal() {
    let _serial = util::exec_lock();
    let dir = tempfile::tempdir().unwrap();
    let encoded = util::truncated_payload(&util::sample_image(50_000), 20_000);
    let launcher = Launcher::new(config_in(dir.path(), &encoded), util::launch_env(&["a"], &[]));
    let recorder = RecordingReplacer::new();

    let Err(err) = launcher.run(&recorder);

    assert!(matches!(err, LaunchError::Decompress(_)), "{err}");
    assert!(recorder.calls().is_empty());
    assert_eq!(util::entries(dir.path()), 1);
}

/// A damaged compressed body or checksum is caught before exec.
#[rstest]
#[case::body(|len| len / 2)]
#[case::trailer(|len| len - 6)]
fn corrupt_stream_is_fatal(#[case] offset: fn(usize) -> usize) {
    let _serial = util::exec_lock();
    let dir = tempfile::tempdir().unwrap();
    let encoded = util::damaged_payload(&util::sample_image(5_000), offset);
    let launcher = Launcher::new(config_in(dir.path(), &encoded), util::launch_env(&["a"], &[]));
    let recorder = RecordingReplacer::new();

    let Err(err) = launcher.run(&recorder);

    assert!(matches!(err, LaunchError::Decompress(_)), "{err}");
    assert!(recorder.calls().is_empty());
}

#[test]
fn empty_payload_is_fatal() {
    let _serial = util::exec_lock();
    let dir = tempfile::tempdir().unwrap();
    let launcher = Launcher::new(config_in(dir.path(), ""), util::launch_env(&["a"], &[]));
    let recorder = RecordingReplacer::new();

    let Err(err) = launcher.run(&recorder);

    assert!(matches!(err, LaunchError::Decompress(_)), "{err}");
    assert!(recorder.calls().is_empty());
}

#[test]
fn missing_scratch_dir_is_fatal() {
    let _serial = util::exec_lock();
    let dir = tempfile::tempdir().unwrap();
    let encoded = util::encode_payload(b"irrelevant");
    let launcher = Launcher::new(
        config_in(&dir.path().join("missing"), &encoded),
        util::launch_env(&["a"], &[]),
    );

    let Err(err) = launcher.run(&RecordingReplacer::new());

    assert!(matches!(err, LaunchError::Allocate { .. }), "{err}");
    assert_eq!(err.stage(), None);
}

/// An image the kernel cannot load surfaces as an exec error.
/// Safe to run in-process: the exec call fails and returns.
#[test]
fn unloadable_image_surfaces_exec_error() {
    let _serial = util::exec_lock();
    let dir = tempfile::tempdir().unwrap();
    let encoded = util::encode_payload(b"\x7fELF but truncated");
    let launcher = Launcher::new(config_in(dir.path(), &encoded), util::launch_env(&["a"], &[]));

    let Err(err) = launcher.run(&ExecReplacer);

    match err {
        LaunchError::Exec { path, source } => {
            assert!(path.starts_with(dir.path()));
            assert!(source.raw_os_error().is_some(), "{source}");
        }
        e => panic!("unexpected error: {e}"),
    }
}

/// Run the staged program for real and inspect what it observed.
#[test]
fn staged_program_observes_arguments_and_environment() {
    let _serial = util::exec_lock();
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("observed");
    let encoded = util::encode_payload(&util::script(
        r#"printf '%s\n' "$@" > "$STAGEXEC_OUT"
printf '%s\n' "$STAGEXEC_VALUE" >> "$STAGEXEC_OUT"
exit 3"#,
    ));
    let out_str = out.to_str().unwrap();
    let env = util::launch_env(
        &["anything", "-x", "42"],
        &[("STAGEXEC_OUT", out_str), ("STAGEXEC_VALUE", "a b=c")],
    );
    let launcher = Launcher::new(config_in(dir.path(), &encoded), env.clone());

    let staged = launcher.stage().unwrap();
    let argv = env.argv(&launcher.config().placeholder).unwrap();
    let envp = env.envp().unwrap();
    let code = ForkExecReplacer
        .spawn_and_wait(&staged.path, &argv, &envp)
        .unwrap();

    assert_eq!(code, 3);
    assert_eq!(std::fs::read_to_string(&out).unwrap(), "-x\n42\na b=c\n");
    assert_eq!(argv[0], CString::new("binary").unwrap());
}

/// Variables that are not UTF-8 are still forwarded byte for byte.
#[test]
fn forwards_non_utf8_environment() {
    use std::{ffi::OsString, os::unix::ffi::OsStringExt as _};

    let _serial = util::exec_lock();
    let dir = tempfile::tempdir().unwrap();
    let encoded = util::encode_payload(&util::script("exit 0"));
    let mut env = util::launch_env(&["a"], &[]);
    env.env.push((OsString::from("RAW"), OsString::from_vec(b"\xffok".to_vec())));
    let envp = env.envp().unwrap();
    let launcher = Launcher::new(config_in(dir.path(), &encoded), env);
    let recorder = RecordingReplacer::new();

    let _ = launcher.run(&recorder);

    assert_eq!(envp[0].as_bytes(), b"RAW=\xffok");
    assert_eq!(recorder.calls()[0].envp, vec!["RAW=\u{FFFD}ok"]);
}
