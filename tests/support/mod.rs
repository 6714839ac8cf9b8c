//! Shared helpers for integration tests

#![allow(dead_code)]

use reposcope::tools::testing::ScriptedTool;
use reposcope::ToolRegistry;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Small Go module with two requirements and a README
pub fn go_repository() -> TempDir {
    let dir = TempDir::new().unwrap();
    write_go_module(dir.path());
    dir
}

/// Writes the Go module files under `root`, creating it if needed
pub fn write_go_module(root: &Path) {
    fs::create_dir_all(root).unwrap();
    fs::write(
        root.join("go.mod"),
        "module example.com/demo\n\ngo 1.21\n\nrequire (\n\tgithub.com/gin-gonic/gin v1.9.1\n\tgolang.org/x/crypto v0.14.0\n)\n",
    )
    .unwrap();
    fs::write(
        root.join("main.go"),
        "package main\n\nimport \"fmt\"\n\n// entry point\nfunc main() {\n\tfmt.Println(\"hello\")\n}\n",
    )
    .unwrap();
    fs::create_dir_all(root.join("internal")).unwrap();
    fs::write(
        root.join("internal/util.go"),
        "package internal\n\nfunc Add(a, b int) int { return a + b }\n",
    )
    .unwrap();
    fs::write(root.join("README.md"), "# demo\n\nA tiny service.\n").unwrap();
}

pub fn registry(tools: Vec<ScriptedTool>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for tool in tools {
        registry.register(Arc::new(tool)).unwrap();
    }
    registry
}

pub fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
