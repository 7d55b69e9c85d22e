use pipeline_convert::core::config::{BackendConfig, ConverterConfig, StorageBackend};
use pipeline_convert::core::convert::target::{TargetStage, TargetStep};
use pipeline_convert::core::convert::{ConversionOutput, Converter};
use pipeline_convert::core::sources::{convert_source, parser_for, SourceParser};
use pipeline_convert::core::{ErrorCategory, SourceFormat};
use serde_json::json;

fn convert_with(config: ConverterConfig, text: &str) -> ConversionOutput {
    let converter = Converter::new(config).unwrap();
    convert_source(&converter, SourceFormat::HarnessV0, text).unwrap()
}

fn convert(text: &str) -> ConversionOutput {
    convert_with(ConverterConfig::default(), text)
}

fn step_ids(stage: &TargetStage) -> Vec<&str> {
    stage.spec.steps.iter().map(|step| step.id.as_str()).collect()
}

const CI_PIPELINE: &str = r#"
pipeline:
  name: Go Service
  identifier: go_service
  variables:
    - name: goVersion
      type: String
      value: "1.22"
  stages:
    - stage:
        name: Build and Test
        identifier: build
        type: CI
        spec:
          cloneCodebase: true
          platform:
            os: Linux
            arch: Arm64
          runtime:
            type: Cloud
            spec: {}
          execution:
            steps:
              - step:
                  type: RestoreCacheS3
                  identifier: restore
                  spec:
                    key: go-<+pipeline.variables.goVersion>
                    bucket: cache
              - step:
                  type: Run
                  name: Unit Tests
                  identifier: test
                  spec:
                    shell: Sh
                    command: go test ./...
                    reports:
                      type: JUnit
                      spec:
                        paths:
                          - report.xml
              - step:
                  type: SaveCacheS3
                  identifier: save
                  spec:
                    key: go-<+pipeline.variables.goVersion>
                    sourcePaths:
                      - /go/pkg/mod
"#;

#[test]
fn ci_stage_converts_and_folds_cache() {
    let output = convert(CI_PIPELINE);
    assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);

    let document = &output.document;
    assert_eq!(document.spec.name.as_deref(), Some("Go Service"));
    assert_eq!(document.spec.inputs["goVersion"].default, Some(json!("1.22")));

    let stage = &document.spec.stages[0];
    assert_eq!(stage.id, "Build_and_Test");
    assert_eq!(stage.name, "Build and Test");
    assert!(stage.spec.clone.is_none());
    assert_eq!(stage.spec.runtime.as_deref(), Some("cloud"));
    assert_eq!(
        stage.spec.platform.as_ref().and_then(|p| p.arch.as_deref()),
        Some("arm64")
    );
    assert_eq!(step_ids(stage), vec!["Unit_Tests"]);

    let cache = stage.spec.cache.as_ref().unwrap();
    assert_eq!(cache.key.as_deref(), Some("go-<+pipeline.variables.goVersion>"));
    assert_eq!(cache.paths, vec!["/go/pkg/mod".to_string()]);

    let TargetStep::Run(run) = &stage.spec.steps[0].step else {
        panic!("expected run step");
    };
    assert_eq!(run.shell.as_deref(), Some("sh"));
    let reports = run.reports.as_ref().unwrap();
    assert_eq!(reports.report_type, "junit");
    assert_eq!(reports.paths, vec!["report.xml".to_string()]);
}

#[test]
fn deployment_stage_keeps_conditions_and_deploy_steps() {
    let output = convert(
        r#"
pipeline:
  identifier: release
  stages:
    - stage:
        identifier: prod
        type: Deployment
        when:
          pipelineStatus: Success
          condition: <+pipeline.variables.env> == "prod"
        spec:
          execution:
            steps:
              - step:
                  type: HarnessApproval
                  identifier: approve
                  spec:
                    approvalMessage: Ship it?
                    approvers:
                      userGroups: [release_managers]
                      minimumCount: 2
              - step:
                  type: K8sRollingDeploy
                  identifier: rollout
                  timeout: 10m
                  when:
                    stageStatus: Success
                  spec:
                    skipDryRun: false
                    pruningEnabled: true
                    delegateSelectors: [k8s-prod]
"#,
    );
    let stage = &output.document.spec.stages[0];
    assert_eq!(stage.stage_type, "deployment");
    assert_eq!(stage.when.as_deref(), Some("<+pipeline.variables.env> == \"prod\""));
    assert_eq!(stage.spec.clone.as_ref().map(|clone| clone.disabled), Some(true));
    assert_eq!(step_ids(stage), vec!["approve", "rollout"]);

    let TargetStep::Approval(approval) = &stage.spec.steps[0].step else {
        panic!("expected approval step");
    };
    assert_eq!(approval.message.as_deref(), Some("Ship it?"));
    assert_eq!(approval.approvers, vec!["release_managers".to_string()]);
    assert_eq!(approval.min_approvers, Some(2));

    let rollout = &stage.spec.steps[1];
    assert_eq!(rollout.timeout.as_deref(), Some("10m"));
    assert_eq!(rollout.delegate, vec!["k8s-prod".to_string()]);
    assert_eq!(rollout.when, None);
    let TargetStep::K8sRollingDeploy(deploy) = &rollout.step else {
        panic!("expected rolling deploy");
    };
    assert!(!deploy.skip_dry_run);
    assert_eq!(deploy.settings.get("pruningEnabled"), Some(&json!(true)));
    assert!(deploy.settings.get("delegateSelectors").is_none());
}

#[test]
fn single_step_group_is_flattened_into_the_stage() {
    let output = convert(
        r#"
pipeline:
  identifier: p
  stages:
    - stage:
        identifier: checks
        type: CI
        spec:
          execution:
            steps:
              - stepGroup:
                  identifier: lint
                  steps:
                    - step: {type: Run, identifier: fmt, spec: {command: gofmt -l .}}
                    - step: {type: Run, identifier: vet, spec: {command: go vet ./...}}
"#,
    );
    let stage = &output.document.spec.stages[0];
    assert_eq!(step_ids(stage), vec!["fmt", "vet"]);
}

#[test]
fn matrix_stage_expands_with_concurrency_cap() {
    let output = convert(
        r#"
pipeline:
  identifier: p
  stages:
    - stage:
        identifier: test
        type: CI
        strategy:
          matrix:
            go: ["1.21", "1.22"]
            maxConcurrency: 1
        spec:
          execution:
            steps:
              - step:
                  type: Run
                  identifier: test
                  spec:
                    image: golang:<+matrix.go>
                    command: go test ./...
"#,
    );
    let stages = &output.document.spec.stages;
    let ids: Vec<&str> = stages.iter().map(|stage| stage.id.as_str()).collect();
    assert_eq!(ids, vec!["test_0", "test_1"]);
    assert_eq!(stages[1].name, "test-1.22");

    let strategy = stages[0].strategy.as_ref().unwrap();
    assert_eq!(strategy.max_parallel, Some(1));
    assert_eq!(strategy.matrix["go"], json!("1.21"));

    let TargetStep::Run(run) = &stages[0].spec.steps[0].step else {
        panic!("expected run step");
    };
    assert_eq!(run.image.as_deref(), Some("golang:<+matrix.go>"));
}

#[test]
fn unknown_step_types_become_placeholders() {
    let output = convert(
        r#"
pipeline:
  identifier: p
  stages:
    - stage:
        identifier: ops
        type: Custom
        spec:
          execution:
            steps:
              - step:
                  type: ShellScript
                  identifier: cleanup
                  spec:
                    shell: Bash
                    source:
                      type: Inline
                      spec:
                        script: ./cleanup.sh
"#,
    );
    let stage = &output.document.spec.stages[0];
    assert_eq!(stage.stage_type, "custom");
    assert_eq!(stage.spec.clone.as_ref().map(|clone| clone.disabled), Some(true));

    let TargetStep::Template(placeholder) = &stage.spec.steps[0].step else {
        panic!("expected template placeholder");
    };
    assert_eq!(placeholder.uses, "ShellScript");
    assert_eq!(placeholder.payload["source"]["spec"]["script"], json!("./cleanup.sh"));
    assert_eq!(stage.spec.steps[0].id, "cleanup");

    let codes: Vec<&str> = output.diagnostics.iter().map(|d| d.code.as_str()).collect();
    assert_eq!(codes, vec!["CONV-STEP-001"]);
}

#[test]
fn gcs_backend_changes_cache_plugin_settings() {
    let config = ConverterConfig {
        backend: BackendConfig {
            kind: StorageBackend::Gcs,
            bucket: Some("ci-cache".into()),
            secret_key_ref: Some("gcp_key".into()),
            ..BackendConfig::default()
        },
        ..ConverterConfig::default()
    };
    let output = convert_with(
        config,
        r#"
pipeline:
  identifier: p
  stages:
    - stage:
        identifier: s
        type: CI
        spec:
          execution:
            steps:
              - step:
                  type: RestoreCacheGCS
                  identifier: restore
                  spec:
                    key: deps
              - step:
                  type: Run
                  identifier: build
                  spec:
                    command: make
"#,
    );
    let stage = &output.document.spec.stages[0];
    let TargetStep::Plugin(plugin) = &stage.spec.steps[0].step else {
        panic!("expected cache plugin");
    };
    assert_eq!(plugin.settings.get_str("backend"), Some("gcs"));
    assert_eq!(plugin.settings.get_str("bucket"), Some("ci-cache"));
    assert_eq!(
        plugin.settings.get_str("json_key"),
        Some("<+secrets.getValue(\"gcp_key\")>")
    );
    assert!(plugin.settings.get("region").is_none());

    let codes: Vec<&str> = output.diagnostics.iter().map(|d| d.code.as_str()).collect();
    assert_eq!(codes, vec!["CONV-CACHE-001"]);
}

#[test]
fn unknown_stage_type_is_reported_before_conversion_diagnostics() {
    let output = convert(
        r#"
pipeline:
  identifier: p
  stages:
    - stage:
        identifier: flags
        type: FeatureFlag
        spec:
          execution:
            steps: []
"#,
    );
    assert_eq!(output.document.spec.stages[0].stage_type, "custom");
    assert_eq!(output.diagnostics[0].code, "CONV-PARSE-011");
}

#[test]
fn parser_reports_its_format() {
    assert_eq!(parser_for(SourceFormat::HarnessV0).format(), SourceFormat::HarnessV0);
    assert_eq!(parser_for(SourceFormat::Circle).format(), SourceFormat::Circle);
}

#[test]
fn empty_stage_list_is_an_error() {
    let converter = Converter::new(ConverterConfig::default()).unwrap();
    let err = convert_source(
        &converter,
        SourceFormat::HarnessV0,
        "pipeline:\n  identifier: p\n  stages: []\n",
    )
    .unwrap_err();
    assert_eq!(err.category, ErrorCategory::ParseError);
}

#[test]
fn use_from_stage_inherits_runtime_and_platform() {
    let output = convert(
        r#"
pipeline:
  identifier: p
  stages:
    - stage:
        identifier: build
        type: CI
        spec:
          runtime:
            type: Cloud
          platform:
            os: Linux
            arch: Arm64
          execution:
            steps:
              - step:
                  type: Run
                  identifier: compile
                  spec:
                    command: make
    - stage:
        identifier: test
        type: CI
        spec:
          infrastructure:
            useFromStage: build
          execution:
            steps:
              - step:
                  type: Run
                  identifier: unit
                  spec:
                    command: make test
"#,
    );
    assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
    let test = &output.document.spec.stages[1];
    assert_eq!(test.spec.runtime.as_deref(), Some("cloud"));
    let platform = test.spec.platform.as_ref().unwrap();
    assert_eq!(platform.os.as_deref(), Some("linux"));
    assert_eq!(platform.arch.as_deref(), Some("arm64"));
}
