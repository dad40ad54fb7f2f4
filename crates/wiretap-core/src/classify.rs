use serde::{Deserialize, Serialize};

/// Coarse category assigned to a spawned command by executable name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolClass {
    PackageManager,
    VersionControl,
    Container,
    Orchestration,
    Runtime,
    BuildSystem,
    HttpClient,
    RemoteAccess,
    Filesystem,
    Unknown,
}

impl ToolClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PackageManager => "package_manager",
            Self::VersionControl => "version_control",
            Self::Container => "container",
            Self::Orchestration => "orchestration",
            Self::Runtime => "runtime",
            Self::BuildSystem => "build_system",
            Self::HttpClient => "http_client",
            Self::RemoteAccess => "remote_access",
            Self::Filesystem => "filesystem",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ToolClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// Order matters: the first category containing the executable wins.
const CLASS_TABLE: &[(ToolClass, &[&str])] = &[
    (ToolClass::PackageManager, &["npm", "yarn", "pnpm"]),
    (ToolClass::VersionControl, &["git"]),
    (ToolClass::Container, &["docker"]),
    (ToolClass::Orchestration, &["kubectl"]),
    (ToolClass::Runtime, &["node", "python", "go"]),
    (ToolClass::BuildSystem, &["make", "cmake", "gradle"]),
    (ToolClass::HttpClient, &["curl", "wget"]),
    (ToolClass::RemoteAccess, &["ssh", "scp"]),
    (ToolClass::Filesystem, &["ls", "cat", "grep"]),
];

/// Classify a command line by its first whitespace-separated token,
/// lowercased. Pure function of the input.
pub fn classify_command(command: &str) -> ToolClass {
    let first = command.split_whitespace().next().unwrap_or("");
    let lowered = first.to_ascii_lowercase();
    for (class, names) in CLASS_TABLE {
        if names.contains(&lowered.as_str()) {
            return *class;
        }
    }
    ToolClass::Unknown
}
