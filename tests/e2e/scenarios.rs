use std::path::{Path, PathBuf};

use super::harness::{RunOutput, Sandbox, TestContext, write_file};

pub struct Scenario {
    pub name: &'static str,
    pub run: fn(&TestContext) -> Result<(), String>,
}

pub fn scenarios() -> Vec<Scenario> {
    vec![
        Scenario {
            name: "help_output",
            run: scenario_help,
        },
        Scenario {
            name: "missing_url",
            run: scenario_missing_url,
        },
        Scenario {
            name: "invalid_url",
            run: scenario_invalid_url,
        },
        Scenario {
            name: "invalid_report_format",
            run: scenario_invalid_report_format,
        },
        Scenario {
            name: "invalid_xcconfig",
            run: scenario_invalid_xcconfig,
        },
        Scenario {
            name: "malformed_config",
            run: scenario_malformed_config,
        },
        Scenario {
            name: "dot_empty_app_repository",
            run: scenario_dot_empty_app_repository,
        },
        Scenario {
            name: "local_package_platforms",
            run: scenario_local_platforms,
        },
        Scenario {
            name: "local_package_dependencies",
            run: scenario_local_dependencies,
        },
        Scenario {
            name: "remote_package_latest_tag",
            run: scenario_remote_latest_tag,
        },
    ]
}

const SAMPLE_MANIFEST: &str = r#"// swift-tools-version: 5.7
import PackageDescription

let package = Package(
    name: "Sample",
    platforms: [.iOS(.v13), .macOS(.v10_15)],
    products: [
        .library(name: "Sample", targets: ["Sample"])
    ],
    targets: [
        .target(name: "Sample")
    ]
)
"#;

fn scenario_help(ctx: &TestContext) -> Result<(), String> {
    let sandbox = ctx.sandbox("help")?;
    ctx.run_tool(&sandbox, &["--help"])?
        .expect_status(0)?
        .expect_stdout("binary-size")?
        .expect_stdout("full-analyzes")?;
    Ok(())
}

fn scenario_missing_url(ctx: &TestContext) -> Result<(), String> {
    let sandbox = ctx.sandbox("missing-url")?;
    ctx.run_tool(&sandbox, &["platforms"])?
        .expect_failure()?
        .expect_stderr("--url")?;
    Ok(())
}

fn scenario_invalid_url(ctx: &TestContext) -> Result<(), String> {
    let sandbox = ctx.sandbox("invalid-url")?;
    ctx.run_tool(&sandbox, &["dependencies", "--url", "not a url"])?
        .expect_failure()?
        .expect_stderr("Invalid package reference")?;
    Ok(())
}

fn scenario_invalid_report_format(ctx: &TestContext) -> Result<(), String> {
    let sandbox = ctx.sandbox("invalid-format")?;
    ctx.run_tool(
        &sandbox,
        &[
            "--url",
            "https://github.com/org/repo",
            "--report-format",
            "yaml",
        ],
    )?
    .expect_failure()?
    .expect_stderr("Unknown report format")?;
    Ok(())
}

fn scenario_invalid_xcconfig(ctx: &TestContext) -> Result<(), String> {
    let sandbox = ctx.sandbox("invalid-xcconfig")?;
    let missing = sandbox.root.join("Missing.xcconfig");
    let missing = missing.to_string_lossy();
    let output = ctx.run_tool(
        &sandbox,
        &[
            "binary-size",
            "--url",
            "https://github.com/org/repo",
            "--xcconfig",
            &missing,
        ],
    )?;
    output.expect_failure()?.expect_stderr("Invalid xcconfig")?;
    if output.stderr.contains("Resolving") {
        return Err("Resolution started despite invalid xcconfig".to_string());
    }
    Ok(())
}

fn scenario_malformed_config(ctx: &TestContext) -> Result<(), String> {
    let sandbox = ctx.sandbox("malformed-config")?;
    let package = sample_package(&sandbox)?;
    write_config(&sandbox, "{ not json")?;

    let package = package.to_string_lossy();
    ctx.run_tool(&sandbox, &["platforms", "--url", &package])?
        .expect_status(1)?
        .expect_stderr("Failed to parse config file")?;
    Ok(())
}

fn scenario_dot_empty_app_repository(ctx: &TestContext) -> Result<(), String> {
    let sandbox = ctx.sandbox("dot-empty-app")?;
    let package = sample_package(&sandbox)?;
    write_config(
        &sandbox,
        r#"{ "empty_app": { "repository": "https://github.com/org/.." } }"#,
    )?;
    write_file(&sandbox.root.join("keep.txt"), "keep")?;

    let package = package.to_string_lossy();
    ctx.run_tool(&sandbox, &["binary-size", "--url", &package])?
        .expect_status(1)?
        .expect_stderr("Invalid empty app repository")?;
    if !sandbox.root.join("keep.txt").exists() {
        return Err("Working directory was modified".to_string());
    }
    Ok(())
}

fn scenario_local_platforms(ctx: &TestContext) -> Result<(), String> {
    if !ctx.has_tool("swift") {
        return Ok(());
    }
    let sandbox = ctx.sandbox("local-platforms")?;
    let package = sample_package(&sandbox)?;
    let package = package.to_string_lossy();

    // Verbose streaming must leave stdout to the JSON report
    let value = ctx
        .run_tool(
            &sandbox,
            &[
                "platforms",
                "--path",
                &package,
                "--report-format",
                "jsonDump",
                "--verbose",
            ],
        )?
        .expect_status(0)?
        .json()?;
    expect_eq(&value["package"]["product"], "Sample")?;
    expect_eq(&value["results"][0]["providerKind"], "platforms")?;
    expect_eq(&value["results"][0]["payload"]["iOS"], "13.0")?;
    expect_eq(&value["results"][0]["payload"]["macOS"], "10.15")?;
    if value["results"][0]["payload"].get("tvOS").is_some() {
        return Err("tvOS should be omitted when not declared".to_string());
    }
    Ok(())
}

fn scenario_local_dependencies(ctx: &TestContext) -> Result<(), String> {
    if !ctx.has_tool("swift") {
        return Ok(());
    }
    let sandbox = ctx.sandbox("local-dependencies")?;
    let package = sample_package(&sandbox)?;
    let package = package.to_string_lossy();

    ctx.run_tool(
        &sandbox,
        &["dependencies", "--local-path", &package, "--product-named", "Unknown"],
    )?
    .expect_status(0)?
    .expect_stdout("Sample")?
    .expect_stdout("no third-party dependencies")?;
    Ok(())
}

fn scenario_remote_latest_tag(ctx: &TestContext) -> Result<(), String> {
    if !ctx.has_tool("swift") || !ctx.has_tool("git") {
        return Ok(());
    }
    let sandbox = ctx.sandbox("remote-latest-tag")?;
    let origin = sample_package(&sandbox)?;
    git(ctx, &sandbox, &["init", "-q"], &origin)?;
    git(ctx, &sandbox, &["add", "."], &origin)?;
    git(
        ctx,
        &sandbox,
        &[
            "-c",
            "user.name=Test",
            "-c",
            "user.email=test@example.com",
            "commit",
            "-q",
            "-m",
            "Initial",
        ],
        &origin,
    )?;
    for tag in ["1.0.0", "v1.2.0", "1.1.0"] {
        git(ctx, &sandbox, &["tag", tag], &origin)?;
    }

    let url = format!("file://{}", origin.display());
    let value = ctx
        .run_tool(
            &sandbox,
            &["platforms", "--url", &url, "--report-format", "jsonDump"],
        )?
        .expect_status(0)?
        .json()?;
    expect_eq(&value["package"]["version"], "1.2.0")?;
    expect_eq(&value["package"]["tagState"], "undefined")?;
    expect_eq(&value["results"][0]["payload"]["iOS"], "13.0")?;
    Ok(())
}

fn sample_package(sandbox: &Sandbox) -> Result<PathBuf, String> {
    let dir = sandbox.root.join("Sample");
    write_file(&dir.join("Package.swift"), SAMPLE_MANIFEST)?;
    write_file(
        &dir.join("Sources").join("Sample").join("Sample.swift"),
        "public struct Sample {}\n",
    )?;
    Ok(dir)
}

fn write_config(sandbox: &Sandbox, content: &str) -> Result<(), String> {
    write_file(
        &sandbox
            .xdg_config
            .join("swift-package-info")
            .join("config.json"),
        content,
    )
}

fn git(ctx: &TestContext, sandbox: &Sandbox, args: &[&str], cwd: &Path) -> Result<RunOutput, String> {
    let output = ctx.run("git", args, cwd, sandbox)?;
    output.expect_status(0)?;
    Ok(output)
}

fn expect_eq(value: &serde_json::Value, expected: &str) -> Result<(), String> {
    if value.as_str() == Some(expected) {
        Ok(())
    } else {
        Err(format!("Expected {:?}, got {}", expected, value))
    }
}
