//! Run configuration: limits, redirections and environment rules.

use std::ffi::{CString, OsString};
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;

use super::BoxError;

/// Everything one supervised run needs, as collected from the command line.
#[derive(Debug, Default)]
pub struct BoxConfig {
    /// Program path and arguments; `command[0]` is exec'd directly, with no
    /// `PATH` search.
    pub command: Vec<OsString>,
    /// Directory to enter inside the child before exec.
    pub chdir: Option<PathBuf>,
    /// Address-space cap in KiB.
    pub mem_kb: Option<u64>,
    /// Created-file size cap in KiB.
    pub fsize_kb: Option<u64>,
    /// Stack cap in KiB; `None` leaves the stack unlimited.
    pub stack_kb: Option<u64>,
    /// Concurrent process cap; `None` means unlimited.
    pub max_processes: Option<u64>,
    /// CPU time limit in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Wall-clock limit in milliseconds.
    pub wall_timeout_ms: Option<u64>,
    /// Extra CPU grace: an over-limit program is only killed once its CPU
    /// time also exceeds this, so the true usage is still measurable.
    pub extra_timeout_ms: u64,
    pub stdin_path: Option<PathBuf>,
    pub stdout_path: Option<PathBuf>,
    pub stderr_path: Option<PathBuf>,
    pub stderr_to_stdout: bool,
    /// Start from the full parent environment instead of an empty one.
    pub inherit_env: bool,
    pub env_rules: Vec<EnvRule>,
    /// Meta-file destination; `-` means stdout.
    pub meta_path: Option<String>,
    /// Suppress non-fatal stderr chatter.
    pub silent: bool,
}

impl BoxConfig {
    pub fn new(command: Vec<OsString>) -> Self {
        BoxConfig {
            command,
            max_processes: Some(1),
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EnvAction {
    /// Copy the variable from the parent environment if present.
    Inherit,
    /// Set the variable to a literal value.
    Set(OsString),
    /// Make sure the variable is absent.
    Unset,
}

/// One `-E` rule. Rules apply in order; later rules win.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnvRule {
    pub var: OsString,
    pub action: EnvAction,
}

impl EnvRule {
    /// Parse `VAR` (inherit), `VAR=` (unset) or `VAR=VAL` (set).
    pub fn parse(spec: &str) -> Option<EnvRule> {
        let (var, action) = match spec.split_once('=') {
            None => (spec, EnvAction::Inherit),
            Some((var, "")) => (var, EnvAction::Unset),
            Some((var, val)) => (var, EnvAction::Set(val.into())),
        };
        if var.is_empty() {
            return None;
        }
        Some(EnvRule {
            var: var.into(),
            action,
        })
    }
}

fn apply_rule(entries: &mut Vec<(OsString, OsString)>, rule: &EnvRule) {
    entries.retain(|(var, _)| var != &rule.var);
    match &rule.action {
        EnvAction::Inherit => {
            if let Some(val) = std::env::var_os(&rule.var) {
                entries.push((rule.var.clone(), val));
            }
        }
        EnvAction::Set(val) => entries.push((rule.var.clone(), val.clone())),
        EnvAction::Unset => {}
    }
}

/// Build the child's environment: the parent's (or nothing), the user rules
/// in order, then the built-in `LIBC_FATAL_STDERR_` rule so glibc aborts
/// land on stderr rather than the child's stdout.
pub fn build_environment(
    inherit_parent: bool,
    rules: &[EnvRule],
) -> Result<Vec<CString>, BoxError> {
    let mut entries: Vec<(OsString, OsString)> = if inherit_parent {
        std::env::vars_os().collect()
    } else {
        Vec::new()
    };

    for rule in rules {
        apply_rule(&mut entries, rule);
    }
    apply_rule(
        &mut entries,
        &EnvRule {
            var: "LIBC_FATAL_STDERR_".into(),
            action: EnvAction::Set("1".into()),
        },
    );

    let mut env = Vec::with_capacity(entries.len());
    for (var, val) in entries {
        let mut entry = var.as_bytes().to_vec();
        entry.push(b'=');
        entry.extend_from_slice(val.as_bytes());
        let entry = CString::new(entry).map_err(|_| {
            BoxError::Config(format!(
                "Environment variable {} contains a NUL byte",
                var.to_string_lossy()
            ))
        })?;
        log::debug!("passing environment: {}", entry.to_string_lossy());
        env.push(entry);
    }
    Ok(env)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(env: &[CString], var: &str) -> Option<String> {
        let prefix = format!("{var}=");
        env.iter()
            .map(|e| e.to_string_lossy().into_owned())
            .find(|e| e.starts_with(&prefix))
    }

    #[test]
    fn rule_parsing() {
        assert_eq!(
            EnvRule::parse("HOME"),
            Some(EnvRule {
                var: "HOME".into(),
                action: EnvAction::Inherit
            })
        );
        assert_eq!(
            EnvRule::parse("LANG=C"),
            Some(EnvRule {
                var: "LANG".into(),
                action: EnvAction::Set("C".into())
            })
        );
        assert_eq!(
            EnvRule::parse("TMPDIR="),
            Some(EnvRule {
                var: "TMPDIR".into(),
                action: EnvAction::Unset
            })
        );
        assert_eq!(EnvRule::parse("=x"), None);
        assert_eq!(EnvRule::parse(""), None);
    }

    #[test]
    fn empty_environment_still_gets_builtin_rule() {
        let env = build_environment(false, &[]).unwrap();
        assert_eq!(env.len(), 1);
        assert_eq!(entry(&env, "LIBC_FATAL_STDERR_").unwrap(), "LIBC_FATAL_STDERR_=1");
    }

    #[test]
    fn set_rule_adds_variable() {
        let env = build_environment(
            false,
            &[EnvRule::parse("JUDGE_MODE=strict").unwrap()],
        )
        .unwrap();
        assert_eq!(entry(&env, "JUDGE_MODE").unwrap(), "JUDGE_MODE=strict");
    }

    #[test]
    fn later_rule_replaces_earlier() {
        let env = build_environment(
            false,
            &[
                EnvRule::parse("X=1").unwrap(),
                EnvRule::parse("X=2").unwrap(),
            ],
        )
        .unwrap();
        assert_eq!(entry(&env, "X").unwrap(), "X=2");
        assert_eq!(env.iter().filter(|e| e.to_bytes().starts_with(b"X=")).count(), 1);
    }

    #[test]
    fn unset_rule_removes_inherited_variable() {
        std::env::set_var("JUDGEBOX_TEST_UNSET", "present");
        let env = build_environment(
            true,
            &[EnvRule::parse("JUDGEBOX_TEST_UNSET=").unwrap()],
        )
        .unwrap();
        assert_eq!(entry(&env, "JUDGEBOX_TEST_UNSET"), None);
    }

    #[test]
    fn inherit_rule_copies_single_variable() {
        std::env::set_var("JUDGEBOX_TEST_INHERIT", "value");
        let env = build_environment(
            false,
            &[EnvRule::parse("JUDGEBOX_TEST_INHERIT").unwrap()],
        )
        .unwrap();
        assert_eq!(
            entry(&env, "JUDGEBOX_TEST_INHERIT").unwrap(),
            "JUDGEBOX_TEST_INHERIT=value"
        );
        // Inheriting a variable the parent does not have is a no-op.
        let env = build_environment(false, &[EnvRule::parse("JUDGEBOX_TEST_MISSING").unwrap()])
            .unwrap();
        assert_eq!(entry(&env, "JUDGEBOX_TEST_MISSING"), None);
    }

    #[test]
    fn builtin_rule_applies_after_user_rules() {
        let env = build_environment(
            false,
            &[EnvRule::parse("LIBC_FATAL_STDERR_=0").unwrap()],
        )
        .unwrap();
        assert_eq!(entry(&env, "LIBC_FATAL_STDERR_").unwrap(), "LIBC_FATAL_STDERR_=1");
    }
}
