use pipeline_convert::core::convert::assembler::{
    render_yaml, CacheFoldPass, GroupFlattenPass, PipelineAssembler, StagePass,
};
use pipeline_convert::core::convert::diagnostics::Diagnostics;
use pipeline_convert::core::convert::flexible::Settings;
use pipeline_convert::core::convert::target::{
    CacheBlock, GroupSpec, PluginSpec, RunSpec, StageSpec, TargetDocument, TargetPipeline,
    TargetStage, TargetStep, TargetStepNode, CACHE_PLUGIN_IMAGE,
};
use pipeline_convert::core::convert::DiagnosticKind;
use serde_json::json;

fn cache(id: &str, role: &str, key: &str) -> TargetStepNode {
    let mut settings = Settings::new();
    settings
        .insert("backend", "s3")
        .insert("cache_key", key)
        .insert("mount", json!([".cache/pip", "venv"]))
        .insert(role, true);
    TargetStepNode {
        id: id.into(),
        ..TargetStepNode::new(TargetStep::Plugin(PluginSpec {
            image: CACHE_PLUGIN_IMAGE.into(),
            settings,
            envs: Default::default(),
        }))
    }
}

fn run(id: &str) -> TargetStepNode {
    TargetStepNode {
        id: id.into(),
        ..TargetStepNode::new(TargetStep::Run(RunSpec {
            script: Some("pytest".into()),
            ..RunSpec::default()
        }))
    }
}

fn group(id: &str, steps: Vec<TargetStepNode>) -> TargetStepNode {
    TargetStepNode {
        id: id.into(),
        ..TargetStepNode::new(TargetStep::Group(GroupSpec { steps }))
    }
}

fn stage(id: &str, steps: Vec<TargetStepNode>) -> TargetStage {
    TargetStage {
        id: id.into(),
        name: id.into(),
        stage_type: "ci".into(),
        when: None,
        strategy: None,
        spec: StageSpec {
            steps,
            ..StageSpec::default()
        },
    }
}

fn document(stages: Vec<TargetStage>) -> TargetDocument {
    TargetDocument::pipeline(TargetPipeline {
        name: None,
        inputs: Default::default(),
        stages,
    })
}

fn ids(stage: &TargetStage) -> Vec<&str> {
    stage.spec.steps.iter().map(|step| step.id.as_str()).collect()
}

#[test]
fn passes_run_cache_fold_first() {
    assert_eq!(
        PipelineAssembler::new().pass_names(),
        vec!["cache-fold", "group-flatten"]
    );
}

#[test]
fn save_without_restore_still_folds() {
    let mut stage = stage("test", vec![run("pytest"), cache("save", "rebuild", "pip")]);
    let mut diagnostics = Diagnostics::new();
    CacheFoldPass.apply(&mut stage, &mut diagnostics);

    assert!(diagnostics.is_empty());
    assert_eq!(ids(&stage), vec!["pytest"]);
    assert_eq!(
        stage.spec.cache,
        Some(CacheBlock {
            enabled: true,
            key: Some("pip".into()),
            paths: vec![".cache/pip".into(), "venv".into()],
        })
    );
}

#[test]
fn restore_without_save_is_kept_with_info_diagnostic() {
    let mut stage = stage("test", vec![cache("restore", "restore", "pip"), run("pytest")]);
    let mut diagnostics = Diagnostics::new();
    CacheFoldPass.apply(&mut stage, &mut diagnostics);

    assert_eq!(ids(&stage), vec!["restore", "pytest"]);
    assert!(stage.spec.cache.is_none());
    let diagnostic = diagnostics.iter().next().unwrap();
    assert_eq!(diagnostic.kind, DiagnosticKind::CacheNotFolded);
    assert_eq!(diagnostic.location.as_deref(), Some("test"));
}

#[test]
fn two_saves_are_not_folded() {
    let mut stage = stage(
        "test",
        vec![cache("save", "rebuild", "pip"), cache("save-1", "rebuild", "pip")],
    );
    let mut diagnostics = Diagnostics::new();
    CacheFoldPass.apply(&mut stage, &mut diagnostics);
    assert_eq!(stage.spec.steps.len(), 2);
    assert_eq!(diagnostics.len(), 1);
}

#[test]
fn conditioned_save_is_not_folded() {
    let mut save = cache("save", "rebuild", "pip");
    save.when = Some("<+always()>".into());
    let mut stage = stage(
        "test",
        vec![cache("restore", "restore", "pip"), run("pytest"), save],
    );
    let mut diagnostics = Diagnostics::new();
    CacheFoldPass.apply(&mut stage, &mut diagnostics);

    assert_eq!(ids(&stage), vec!["restore", "pytest", "save"]);
    assert_eq!(stage.spec.steps[2].when.as_deref(), Some("<+always()>"));
    assert!(stage.spec.cache.is_none());
    let diagnostic = diagnostics.iter().next().unwrap();
    assert_eq!(diagnostic.code, "CONV-CACHE-001");
    assert!(diagnostic.message.contains("<+always()>"), "{}", diagnostic.message);
}

#[test]
fn cache_step_with_timeout_or_envs_is_not_folded() {
    let mut restore = cache("restore", "restore", "pip");
    restore.timeout = Some("5m".into());
    let mut timed = stage("timed", vec![restore, cache("save", "rebuild", "pip")]);

    let mut save = cache("save", "rebuild", "pip");
    if let TargetStep::Plugin(plugin) = &mut save.step {
        plugin.envs.insert("PIP_CACHE_DIR".into(), ".cache/pip".into());
    }
    let mut with_envs = stage("envs", vec![cache("restore", "restore", "pip"), save]);

    let mut diagnostics = Diagnostics::new();
    CacheFoldPass.apply(&mut timed, &mut diagnostics);
    CacheFoldPass.apply(&mut with_envs, &mut diagnostics);

    assert!(timed.spec.cache.is_none());
    assert!(with_envs.spec.cache.is_none());
    assert_eq!(timed.spec.steps.len(), 2);
    assert_eq!(with_envs.spec.steps.len(), 2);
    let messages: Vec<&str> = diagnostics.iter().map(|d| d.message.as_str()).collect();
    assert!(messages[0].contains("timeout"), "{:?}", messages);
    assert!(messages[1].contains("envs"), "{:?}", messages);
}

#[test]
fn stages_without_cache_steps_are_silent() {
    let mut stage = stage("lint", vec![run("lint")]);
    let mut diagnostics = Diagnostics::new();
    CacheFoldPass.apply(&mut stage, &mut diagnostics);
    assert!(diagnostics.is_empty());
    assert!(stage.spec.cache.is_none());
}

#[test]
fn group_among_siblings_is_not_flattened() {
    let mut stage = stage("test", vec![group("setup", vec![run("a")]), run("b")]);
    GroupFlattenPass.apply(&mut stage, &mut Diagnostics::new());
    assert_eq!(ids(&stage), vec!["setup", "b"]);
}

#[test]
fn cache_steps_inside_a_group_survive_flattening() {
    // Folding only inspects top-level steps, and it runs before flattening.
    let mut document = document(vec![stage(
        "test",
        vec![group(
            "job",
            vec![
                cache("restore", "restore", "pip"),
                run("pytest"),
                cache("save", "rebuild", "pip"),
            ],
        )],
    )]);
    let mut diagnostics = Diagnostics::new();
    PipelineAssembler::new().assemble(&mut document, &mut diagnostics);

    let stage = &document.spec.stages[0];
    assert_eq!(ids(stage), vec!["restore", "pytest", "save"]);
    assert!(stage.spec.cache.is_none());
    assert!(diagnostics.is_empty());
}

#[test]
fn every_stage_is_assembled() {
    let mut document = document(vec![
        stage(
            "build",
            vec![cache("restore", "restore", "k"), run("make"), cache("save", "rebuild", "k")],
        ),
        stage("test", vec![group("g", vec![run("unit"), run("e2e")])]),
    ]);
    PipelineAssembler::new().assemble(&mut document, &mut Diagnostics::new());

    assert_eq!(ids(&document.spec.stages[0]), vec!["make"]);
    assert!(document.spec.stages[0].spec.cache.is_some());
    assert_eq!(ids(&document.spec.stages[1]), vec!["unit", "e2e"]);
}

#[test]
fn rendered_document_uses_target_field_names() {
    let mut stage = stage("build", vec![run("test")]);
    stage.spec.cache = Some(CacheBlock {
        enabled: true,
        key: Some("pip".into()),
        paths: vec!["venv".into()],
    });
    stage.when = Some("<+codebase.branch> == \"main\"".into());
    let yaml = render_yaml(&document(vec![stage])).unwrap();

    let parsed: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
    let expected: serde_yaml::Value = serde_yaml::from_str(
        r#"
version: 1
kind: pipeline
spec:
  stages:
    - id: build
      name: build
      type: ci
      if: '<+codebase.branch> == "main"'
      spec:
        cache:
          enabled: true
          key: pip
          paths: [venv]
        steps:
          - id: test
            type: run
            spec:
              script: pytest
"#,
    )
    .unwrap();
    assert_eq!(parsed, expected);
}
