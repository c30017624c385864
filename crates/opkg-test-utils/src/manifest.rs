//! [`ManifestBuilder`] produces `openpackage.yml` text for fixtures.

/// Builder for manifest YAML.
///
/// # Example
///
/// ```
/// use opkg_test_utils::ManifestBuilder;
///
/// let yaml = ManifestBuilder::new("rules")
///     .version("1.0.0")
///     .registry_dep("core", "^1.0.0")
///     .to_yaml();
/// assert!(yaml.contains("name: core"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ManifestBuilder {
    name: String,
    version: Option<String>,
    dependencies: Vec<String>,
    dev_dependencies: Vec<String>,
}

impl ManifestBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn version(mut self, version: &str) -> Self {
        self.version = Some(version.to_string());
        self
    }

    /// Registry dependency. An empty `range` omits the `version` key.
    pub fn registry_dep(mut self, name: &str, range: &str) -> Self {
        self.dependencies.push(registry_entry(name, range));
        self
    }

    pub fn dev_registry_dep(mut self, name: &str, range: &str) -> Self {
        self.dev_dependencies.push(registry_entry(name, range));
        self
    }

    pub fn path_dep(mut self, name: &str, path: &str) -> Self {
        self.dependencies
            .push(format!("  - name: {name}\n    path: \"{path}\"\n"));
        self
    }

    pub fn git_dep(
        mut self,
        name: &str,
        url: &str,
        reference: Option<&str>,
        subpath: Option<&str>,
    ) -> Self {
        let mut entry = format!("  - name: {name}\n    url: \"{url}\"\n");
        if let Some(r) = reference {
            entry.push_str(&format!("    ref: \"{r}\"\n"));
        }
        if let Some(s) = subpath {
            entry.push_str(&format!("    subpath: \"{s}\"\n"));
        }
        self.dependencies.push(entry);
        self
    }

    /// Append a raw, already-indented dependency entry.
    pub fn raw_dep(mut self, entry: &str) -> Self {
        self.dependencies.push(entry.to_string());
        self
    }

    pub fn to_yaml(&self) -> String {
        let mut out = format!("name: {}\n", self.name);
        if let Some(v) = &self.version {
            out.push_str(&format!("version: \"{v}\"\n"));
        }
        push_list(&mut out, "dependencies", &self.dependencies);
        push_list(&mut out, "dev-dependencies", &self.dev_dependencies);
        out
    }
}

fn registry_entry(name: &str, range: &str) -> String {
    if range.is_empty() {
        format!("  - name: {name}\n")
    } else {
        format!("  - name: {name}\n    version: \"{range}\"\n")
    }
}

fn push_list(out: &mut String, key: &str, entries: &[String]) {
    if entries.is_empty() {
        return;
    }
    out.push_str(key);
    out.push_str(":\n");
    for entry in entries {
        out.push_str(entry);
    }
}
