//! Build command construction
//!
//! Translates a build target into the repo2docker invocation that turns a
//! repository into the named image. The image carries kiln's labels so the
//! inventory can tell service-built objects apart from everything else in
//! the runtime.

use tokio::process::Command;

use kiln_core::domain::{RepoSource, ResourceLimits};

/// Label identifying images (and containers started from them) as built by
/// this service. The value is the target name.
pub const ENVIRONMENT_LABEL: &str = "kiln.environment";
/// Label carrying the memory ceiling of the environment
pub const MEM_LIMIT_LABEL: &str = "kiln.mem_limit";
/// Label carrying the CPU ceiling of the environment
pub const CPU_LIMIT_LABEL: &str = "kiln.cpu_limit";

/// Fallback builder program when the configured command is empty
const DEFAULT_BUILDER: &str = "jupyter-repo2docker";

/// Image reference for a build target: `<name>:<tag>`, where the tag is the
/// requested revision made safe for the runtime's tag grammar.
pub fn image_reference(name: &str, reference: &str) -> String {
    format!("{}:{}", name, tag_from_reference(reference))
}

/// Turn a git revision into a valid image tag.
///
/// Tags allow `[A-Za-z0-9_.-]` up to 128 chars and must not start with a
/// separator; everything else becomes `-`.
pub fn tag_from_reference(reference: &str) -> String {
    let mut tag: String = reference
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .take(128)
        .collect();
    while tag.starts_with('.') || tag.starts_with('-') {
        tag.remove(0);
    }
    if tag.is_empty() {
        tag.push_str("latest");
    }
    tag
}

/// Assemble the repo2docker command for one build.
///
/// `builder_cmd` is the program plus leading arguments (e.g.
/// `["python3", "-m", "jupyter_repo2docker"]`), configurable so deployments
/// can pin interpreters or wrap the builder.
pub fn build_command(
    builder_cmd: &[String],
    name: &str,
    source: &RepoSource,
    limits: &ResourceLimits,
) -> Command {
    let mut parts = builder_cmd.iter();
    let program = parts.next().map(String::as_str).unwrap_or(DEFAULT_BUILDER);

    let mut command = Command::new(program);
    command.args(parts);
    command
        .arg("--ref")
        .arg(&source.reference)
        .arg("--user-name")
        .arg("jovyan")
        .arg("--user-id")
        .arg("1100")
        .arg("--no-run")
        .arg("--image-name")
        .arg(image_reference(name, &source.reference))
        .arg("--label")
        .arg(format!("{}={}", ENVIRONMENT_LABEL, name));

    if let Some(memory) = &limits.memory {
        command
            .arg("--build-memory-limit")
            .arg(memory)
            .arg("--label")
            .arg(format!("{}={}", MEM_LIMIT_LABEL, memory));
    }
    if let Some(cpu) = &limits.cpu {
        command
            .arg("--label")
            .arg(format!("{}={}", CPU_LIMIT_LABEL, cpu));
    }

    command.arg(&source.repository);
    command
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args_of(command: &Command) -> Vec<String> {
        command
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn tag_sanitizes_revisions() {
        assert_eq!(tag_from_reference("main"), "main");
        assert_eq!(tag_from_reference("v1.2.3"), "v1.2.3");
        assert_eq!(tag_from_reference("feature/log-streaming"), "feature-log-streaming");
        assert_eq!(tag_from_reference("///"), "latest");
        assert_eq!(tag_from_reference(""), "latest");
    }

    #[test]
    fn image_reference_uses_sanitized_tag() {
        assert_eq!(image_reference("course-env", "HEAD"), "course-env:HEAD");
        assert_eq!(image_reference("course-env", "wip/x"), "course-env:wip-x");
    }

    #[test]
    fn command_includes_source_and_labels() {
        let builder = vec!["python3".to_string(), "-m".to_string(), "jupyter_repo2docker".to_string()];
        let source = RepoSource::new("https://example.com/x.git", Some("main".to_string()));
        let limits = ResourceLimits {
            memory: Some("2G".to_string()),
            cpu: Some("2".to_string()),
        };

        let command = build_command(&builder, "course-env", &source, &limits);

        assert_eq!(command.as_std().get_program().to_string_lossy(), "python3");
        let args = args_of(&command);
        assert_eq!(args.first().map(String::as_str), Some("-m"));
        assert_eq!(args.last().map(String::as_str), Some("https://example.com/x.git"));
        assert!(args.contains(&"--no-run".to_string()));
        assert!(args.contains(&"course-env:main".to_string()));
        assert!(args.contains(&"kiln.environment=course-env".to_string()));
        assert!(args.contains(&"--build-memory-limit".to_string()));
        assert!(args.contains(&"kiln.mem_limit=2G".to_string()));
        assert!(args.contains(&"kiln.cpu_limit=2".to_string()));
    }

    #[test]
    fn limits_are_optional() {
        let builder = vec!["jupyter-repo2docker".to_string()];
        let source = RepoSource::new("https://example.com/x.git", None);

        let command = build_command(&builder, "env", &source, &ResourceLimits::default());

        let args = args_of(&command);
        assert!(!args.contains(&"--build-memory-limit".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("kiln.mem_limit=")));
        assert!(args.contains(&"env:HEAD".to_string()));
    }
}
