//! Shared helpers for resolver integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use opkg_manifest::YamlManifestReader;
use opkg_resolve::{
    CancellationFlag, ContentLoader, ExecutionResult, Executor, ExecutorOptions, FileError,
    GraphBuilder, InstallError, InstallReport, InstallationContext, Installer, LoaderCaches,
    SourceLoaders,
};
use opkg_test_utils::TestWorkspace;

/// Installer that records every call and fails the packages it is told to.
#[derive(Default)]
pub struct RecordingInstaller {
    calls: Mutex<Vec<String>>,
    fail: HashSet<String>,
    file_errors: HashSet<String>,
    cancel_after_first: Option<CancellationFlag>,
}

impl RecordingInstaller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(names: &[&str]) -> Self {
        Self {
            fail: names.iter().map(|n| n.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn with_file_errors(names: &[&str]) -> Self {
        Self {
            file_errors: names.iter().map(|n| n.to_string()).collect(),
            ..Self::default()
        }
    }

    /// Cancel `flag` as soon as the first package is installed.
    pub fn cancelling(flag: CancellationFlag) -> Self {
        Self {
            cancel_after_first: Some(flag),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Installer for RecordingInstaller {
    async fn install(&self, context: &InstallationContext) -> Result<InstallReport, InstallError> {
        self.calls.lock().unwrap().push(context.package_name.clone());

        if let Some(flag) = &self.cancel_after_first {
            flag.cancel();
        }
        if self.fail.contains(&context.package_name) {
            return Err(format!("disk full while installing {}", context.package_name).into());
        }

        let mut report = InstallReport {
            installed: vec![context.content_root.join("README.md")],
            ..Default::default()
        };
        if self.file_errors.contains(&context.package_name) {
            report.errors.push(FileError {
                path: context.content_root.join("rules.md"),
                message: "permission denied".to_string(),
            });
        }
        Ok(report)
    }
}

pub fn loaders(ws: &TestWorkspace) -> SourceLoaders {
    SourceLoaders::local(ws.registry_dir(), ws.cache_dir())
}

pub fn executor(ws: &TestWorkspace, installer: Arc<RecordingInstaller>) -> Executor {
    Executor::new(
        loaders(ws),
        Arc::new(YamlManifestReader),
        LoaderCaches::new(),
        installer,
    )
}

pub fn graph_builder(ws: &TestWorkspace) -> GraphBuilder {
    GraphBuilder::new(ContentLoader::new(
        loaders(ws),
        Arc::new(YamlManifestReader),
        LoaderCaches::new(),
    ))
}

pub fn options(ws: &TestWorkspace) -> ExecutorOptions {
    ExecutorOptions::new(ws.root())
}

/// Package names in plan order.
pub fn planned(result: &ExecutionResult) -> Vec<String> {
    result
        .plan
        .as_ref()
        .map(|plan| {
            plan.contexts
                .iter()
                .map(|c| c.package_name.clone())
                .collect()
        })
        .unwrap_or_default()
}

/// Publish every `(name, version, deps)` triple into the workspace registry.
pub fn publish(ws: &TestWorkspace, packages: &[(&str, &str, &[(&str, &str)])]) {
    for (name, version, deps) in packages {
        let mut builder = opkg_test_utils::ManifestBuilder::new(name).version(version);
        for (dep, range) in deps.iter() {
            builder = builder.registry_dep(dep, range);
        }
        ws.registry_package(builder);
    }
}
