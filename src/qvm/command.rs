//! Typed builders for `qvm-*` invocations and guest shell commands.

use std::fmt;

/// User a guest command runs as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    /// The template's default user.
    Caller,
    Root,
}

/// A single word of a guest shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellWord {
    /// Passed to the guest shell verbatim after quoting.
    Literal(String),
    /// Left unquoted so the guest shell expands it. Static only.
    Glob(&'static str),
}

impl ShellWord {
    fn render(&self) -> String {
        match self {
            ShellWord::Literal(s) => shell_quote(s),
            ShellWord::Glob(pattern) => (*pattern).to_string(),
        }
    }
}

impl From<&str> for ShellWord {
    fn from(s: &str) -> Self {
        ShellWord::Literal(s.to_string())
    }
}

impl From<String> for ShellWord {
    fn from(s: String) -> Self {
        ShellWord::Literal(s)
    }
}

/// A guest command: one or more argument vectors chained with `&&`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestCommand {
    steps: Vec<Vec<ShellWord>>,
}

impl GuestCommand {
    /// Start a command from its first argument vector.
    pub fn new<I, W>(argv: I) -> Self
    where
        I: IntoIterator<Item = W>,
        W: Into<ShellWord>,
    {
        Self {
            steps: vec![argv.into_iter().map(Into::into).collect()],
        }
    }

    /// Chain another step that only runs if the previous ones succeeded.
    pub fn and<I, W>(mut self, argv: I) -> Self
    where
        I: IntoIterator<Item = W>,
        W: Into<ShellWord>,
    {
        self.steps.push(argv.into_iter().map(Into::into).collect());
        self
    }

    /// Render as a single line for the guest shell.
    pub fn render(&self) -> String {
        self.steps
            .iter()
            .map(|step| {
                step.iter()
                    .map(ShellWord::render)
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>()
            .join(" && ")
    }
}

impl fmt::Display for GuestCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// One call into the VM management interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// `qvm-features VM KEY`
    FeatureGet { vm: String, key: String },
    /// `qvm-run [--pass-io] [--user root] VM CMD`
    Run {
        vm: String,
        command: GuestCommand,
        privilege: Privilege,
        capture: bool,
        read_only: bool,
    },
    /// `qvm-run --pass-io --service VM SERVICE`
    Service { vm: String, service: String },
    /// `qvm-clone SOURCE TARGET`
    Clone { source: String, target: String },
    /// `qvm-start [--skip-if-running] VM`
    Start { vm: String, skip_if_running: bool },
    /// `qvm-shutdown [--wait] VM`
    Shutdown { vm: String, wait: bool },
}

impl Invocation {
    pub fn feature(vm: &str, key: &str) -> Self {
        Invocation::FeatureGet {
            vm: vm.to_string(),
            key: key.to_string(),
        }
    }

    /// Unprivileged, captured guest command that changes nothing.
    pub fn guest_read(vm: &str, command: GuestCommand) -> Self {
        Invocation::Run {
            vm: vm.to_string(),
            command,
            privilege: Privilege::Caller,
            capture: true,
            read_only: true,
        }
    }

    /// Guest command with side effects.
    pub fn guest(vm: &str, command: GuestCommand, privilege: Privilege, capture: bool) -> Self {
        Invocation::Run {
            vm: vm.to_string(),
            command,
            privilege,
            capture,
            read_only: false,
        }
    }

    pub fn service(vm: &str, service: &str) -> Self {
        Invocation::Service {
            vm: vm.to_string(),
            service: service.to_string(),
        }
    }

    pub fn clone_vm(source: &str, target: &str) -> Self {
        Invocation::Clone {
            source: source.to_string(),
            target: target.to_string(),
        }
    }

    pub fn start(vm: &str) -> Self {
        Invocation::Start {
            vm: vm.to_string(),
            skip_if_running: true,
        }
    }

    pub fn shutdown(vm: &str) -> Self {
        Invocation::Shutdown {
            vm: vm.to_string(),
            wait: true,
        }
    }

    /// Environment the invocation addresses. For a clone, the new VM.
    pub fn vm(&self) -> &str {
        match self {
            Invocation::FeatureGet { vm, .. }
            | Invocation::Run { vm, .. }
            | Invocation::Service { vm, .. }
            | Invocation::Start { vm, .. }
            | Invocation::Shutdown { vm, .. } => vm,
            Invocation::Clone { target, .. } => target,
        }
    }

    pub fn privilege(&self) -> Privilege {
        match self {
            Invocation::Run { privilege, .. } => *privilege,
            _ => Privilege::Caller,
        }
    }

    /// Whether stdout is returned to the caller.
    pub fn captures_output(&self) -> bool {
        match self {
            Invocation::FeatureGet { .. } | Invocation::Service { .. } => true,
            Invocation::Run { capture, .. } => *capture,
            _ => false,
        }
    }

    /// Whether the invocation may change any VM state.
    pub fn is_mutating(&self) -> bool {
        match self {
            Invocation::FeatureGet { .. } => false,
            Invocation::Run { read_only, .. } => !read_only,
            _ => true,
        }
    }

    /// Program and explicit argument list, without any host shell.
    pub fn argv(&self) -> (&'static str, Vec<String>) {
        match self {
            Invocation::FeatureGet { vm, key } => ("qvm-features", vec![vm.clone(), key.clone()]),
            Invocation::Run {
                vm,
                command,
                privilege,
                capture,
                ..
            } => {
                let mut args = Vec::new();
                if *capture {
                    args.push("--pass-io".to_string());
                }
                if *privilege == Privilege::Root {
                    args.extend(["--user".to_string(), "root".to_string()]);
                }
                args.push(vm.clone());
                args.push(command.render());
                ("qvm-run", args)
            }
            Invocation::Service { vm, service } => (
                "qvm-run",
                vec![
                    "--pass-io".to_string(),
                    "--service".to_string(),
                    vm.clone(),
                    service.clone(),
                ],
            ),
            Invocation::Clone { source, target } => {
                ("qvm-clone", vec![source.clone(), target.clone()])
            }
            Invocation::Start {
                vm,
                skip_if_running,
            } => {
                let mut args = Vec::new();
                if *skip_if_running {
                    args.push("--skip-if-running".to_string());
                }
                args.push(vm.clone());
                ("qvm-start", args)
            }
            Invocation::Shutdown { vm, wait } => {
                let mut args = Vec::new();
                if *wait {
                    args.push("--wait".to_string());
                }
                args.push(vm.clone());
                ("qvm-shutdown", args)
            }
        }
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (program, args) = self.argv();
        write!(f, "{}", program)?;
        for arg in &args {
            write!(f, " {}", shell_quote(arg))?;
        }
        Ok(())
    }
}

/// Quote a word for a POSIX shell. Words made only of safe characters
/// are returned unchanged.
pub fn shell_quote(word: &str) -> String {
    let safe = |c: char| c.is_ascii_alphanumeric() || "_-./=:,+@%".contains(c);
    if !word.is_empty() && word.chars().all(safe) {
        return word.to_string();
    }
    format!("'{}'", word.replace('\'', r"'\''"))
}

/// Escape a token for use as a literal pattern in a sed `s///` expression.
pub fn sed_escape_pattern(token: &str) -> String {
    let mut out = String::with_capacity(token.len());
    for c in token.chars() {
        if matches!(c, '\\' | '/' | '.' | '*' | '[' | ']' | '^' | '$') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Escape a token for use as the replacement in a sed `s///` expression.
pub fn sed_escape_replacement(token: &str) -> String {
    let mut out = String::with_capacity(token.len());
    for c in token.chars() {
        if matches!(c, '\\' | '/' | '&') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote_safe_word() {
        assert_eq!(shell_quote("--releasever=39"), "--releasever=39");
        assert_eq!(shell_quote("/etc/os-release"), "/etc/os-release");
    }

    #[test]
    fn test_shell_quote_unsafe_word() {
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote("x;rm -rf /"), "'x;rm -rf /'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn test_guest_command_render_chain() {
        let cmd = GuestCommand::new(["apt", "update"]).and(["apt", "clean"]);
        assert_eq!(cmd.render(), "apt update && apt clean");
    }

    #[test]
    fn test_guest_command_glob_is_not_quoted() {
        let cmd = GuestCommand::new([
            ShellWord::from("ls"),
            ShellWord::Glob("/etc/apt/sources.list.d/*.list"),
        ]);
        assert_eq!(cmd.render(), "ls /etc/apt/sources.list.d/*.list");
    }

    #[test]
    fn test_run_argv_root_capture() {
        let inv = Invocation::guest(
            "debian-12",
            GuestCommand::new(["fstrim", "-av"]),
            Privilege::Root,
            true,
        );
        let (program, args) = inv.argv();
        assert_eq!(program, "qvm-run");
        assert_eq!(
            args,
            vec!["--pass-io", "--user", "root", "debian-12", "fstrim -av"]
        );
        assert!(inv.is_mutating());
    }

    #[test]
    fn test_guest_read_is_not_mutating() {
        let command = GuestCommand::new(["cat", "/etc/fedora-release"]);
        let inv = Invocation::guest_read("fedora-38", command);
        assert!(!inv.is_mutating());
        assert!(inv.captures_output());
        assert_eq!(inv.privilege(), Privilege::Caller);
    }

    #[test]
    fn test_clone_targets_new_vm() {
        let inv = Invocation::clone_vm("fedora-38", "tmpl-new");
        assert_eq!(inv.vm(), "tmpl-new");
        assert_eq!(inv.to_string(), "qvm-clone fedora-38 tmpl-new");
    }

    #[test]
    fn test_display_start_and_shutdown() {
        assert_eq!(
            Invocation::start("work").to_string(),
            "qvm-start --skip-if-running work"
        );
        assert_eq!(
            Invocation::shutdown("work").to_string(),
            "qvm-shutdown --wait work"
        );
    }

    #[test]
    fn test_display_quotes_guest_command() {
        let inv = Invocation::guest_read("work", GuestCommand::new(["cat", "/etc/debian_version"]));
        assert_eq!(
            inv.to_string(),
            "qvm-run --pass-io work 'cat /etc/debian_version'"
        );
    }

    #[test]
    fn test_sed_escape() {
        assert_eq!(sed_escape_pattern("bookworm"), "bookworm");
        assert_eq!(sed_escape_pattern("1.0/x*"), r"1\.0\/x\*");
        assert_eq!(sed_escape_replacement("a&b/c"), r"a\&b\/c");
    }
}
