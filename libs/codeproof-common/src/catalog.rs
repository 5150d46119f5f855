/// Builtin runtime adapters.
///
/// Adding a language means adding a constructor here and registering it
/// in `Registry::builtin`; callers never change.

use crate::runtime::{LanguageRuntime, ManifestTemplate, ReportFormat, RuntimeVersion, SyntaxCheck};
use regex::Regex;

const PYTHON_DOCKERFILE: &str = r#"FROM {{base_image}}

WORKDIR /app

ENV PYTHONDONTWRITEBYTECODE=1
RUN pip install --no-cache-dir pytest pytest-json-report

COPY {{artifact}} /app/{{artifact}}
"#;

const JAVA_DOCKERFILE: &str = r#"FROM {{base_image}}

WORKDIR /app

COPY pom.xml /app/pom.xml
RUN mvn -B -q dependency:go-offline

COPY {{artifact}} /app/src/test/java/{{artifact}}
RUN mvn -B -q test-compile
"#;

const JAVA_POM: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<project xmlns="http://maven.apache.org/POM/4.0.0"
         xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
         xsi:schemaLocation="http://maven.apache.org/POM/4.0.0 http://maven.apache.org/xsd/maven-4.0.0.xsd">
  <modelVersion>4.0.0</modelVersion>

  <groupId>dev.codeproof</groupId>
  <artifactId>sandbox-{{token}}</artifactId>
  <version>1.0.0</version>

  <properties>
    <maven.compiler.source>{{version}}</maven.compiler.source>
    <maven.compiler.target>{{version}}</maven.compiler.target>
    <project.build.sourceEncoding>UTF-8</project.build.sourceEncoding>
  </properties>

  <dependencies>
    <dependency>
      <groupId>org.junit.jupiter</groupId>
      <artifactId>junit-jupiter</artifactId>
      <version>5.10.2</version>
      <scope>test</scope>
    </dependency>
  </dependencies>

  <build>
    <plugins>
      <plugin>
        <groupId>org.apache.maven.plugins</groupId>
        <artifactId>maven-surefire-plugin</artifactId>
        <version>3.2.5</version>
      </plugin>
    </plugins>
  </build>
</project>
"#;

const JAVA_SOURCE: &str = r#"import static org.junit.jupiter.api.Assertions.*;

import org.junit.jupiter.api.Test;

public class TestClass {

{{implementation}}

{{tests}}
}
"#;

fn strings(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// Python + pytest, report via pytest-json-report
pub fn python() -> LanguageRuntime {
    let versions = ["3.6", "3.7", "3.8", "3.9", "3.10", "3.11"]
        .iter()
        .map(|v| RuntimeVersion::new(*v, format!("python:{}", v)))
        .collect();

    LanguageRuntime {
        id: "python".to_string(),
        versions,
        default_version: "3.11".to_string(),
        extension: "py".to_string(),
        artifact_template: "code_{{token}}.py".to_string(),
        // Python resolves names by prior definition: implementation must come first
        source_template: "{{implementation}}\n\n{{tests}}\n".to_string(),
        manifests: vec![ManifestTemplate::new("Dockerfile", PYTHON_DOCKERFILE)],
        run_command: strings(&[
            "pytest",
            "/app/{{artifact}}",
            "-v",
            "-k",
            "test_",
            "-p",
            "no:cacheprovider",
            "--json-report",
            "--json-report-file={{report_path}}",
        ]),
        report_path: "/app/test_results.json".to_string(),
        report_format: ReportFormat::PytestJson,
        test_pattern: Regex::new(r"\bdef\s+test_\w*\s*\(").expect("valid python test pattern"),
        test_hint: "Test functions must start with 'test_'.".to_string(),
        offline: true,
        syntax: Some(SyntaxCheck::Python),
        compiles_in_build: false,
    }
}

/// Java + JUnit 5 via Maven Surefire
pub fn java() -> LanguageRuntime {
    LanguageRuntime {
        id: "java".to_string(),
        versions: vec![
            RuntimeVersion::new("11", "maven:3.8.1-adoptopenjdk-11"),
            RuntimeVersion::new("17", "maven:3.8.1-openjdk-17-slim"),
        ],
        default_version: "11".to_string(),
        extension: "java".to_string(),
        artifact_template: "TestClass.java".to_string(),
        source_template: JAVA_SOURCE.to_string(),
        manifests: vec![
            ManifestTemplate::new("Dockerfile", JAVA_DOCKERFILE),
            ManifestTemplate::new("pom.xml", JAVA_POM),
        ],
        run_command: strings(&["mvn", "-B", "test", "-Dmaven.test.failure.ignore=true"]),
        report_path: "/app/target/surefire-reports/TEST-TestClass.xml".to_string(),
        report_format: ReportFormat::JunitXml,
        test_pattern: Regex::new(r"@Test\b").expect("valid java test pattern"),
        test_hint: "Test methods must be annotated with '@Test'.".to_string(),
        // Surefire resolves its JUnit platform provider at test time
        offline: false,
        syntax: None,
        compiles_in_build: true,
    }
}
