//! Workflow engine
//!
//! Runs steps strictly in order against one shared context. Every
//! invocation, nested ones included, opens an execution log entry before
//! dispatch and closes it exactly once afterwards.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::domain::execution_log::{ExecutionLog, ExecutionLogId, ExecutionLogStore, LogCompletion};
use crate::domain::workflow::{
    handler_key, ExecutionContext, HandlerRegistry, NestedStepExecutor, OnErrorAction, RunSummary,
    StepId, StepOutcome, StepResult, StepsRun, Workflow, WorkflowError, WorkflowExecutor,
    WorkflowId, WorkflowStep,
};

/// Configuration for the workflow engine
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkflowEngineConfig {
    /// Error policy when neither the step nor the workflow sets one
    pub default_on_error: OnErrorAction,

    /// Reject workflows naming unregistered step types before running them
    pub strict_validation: bool,

    /// Maximum nesting depth of CONDITION / FOR_EACH children
    pub max_depth: usize,
}

impl Default for WorkflowEngineConfig {
    fn default() -> Self {
        Self {
            default_on_error: OnErrorAction::Continue,
            strict_validation: false,
            max_depth: 16,
        }
    }
}

/// Workflow engine dispatching steps to registered handlers
pub struct WorkflowEngine {
    registry: Arc<HandlerRegistry>,
    log_store: Arc<dyn ExecutionLogStore>,
    config: WorkflowEngineConfig,
}

impl fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Framing of one list of steps being executed
///
/// Handlers receive the scope of their own invocation, so children they run
/// are logged under it and one level deeper.
struct RunScope<'a> {
    engine: &'a WorkflowEngine,
    workflow_id: &'a WorkflowId,
    workflow_on_error: Option<OnErrorAction>,
    parent_log_id: Option<ExecutionLogId>,
    depth: usize,
}

impl<'a> RunScope<'a> {
    fn root(engine: &'a WorkflowEngine, workflow_id: &'a WorkflowId) -> Self {
        Self {
            engine,
            workflow_id,
            workflow_on_error: None,
            parent_log_id: None,
            depth: 0,
        }
    }

    fn child(&self, parent_log_id: ExecutionLogId) -> Self {
        Self {
            engine: self.engine,
            workflow_id: self.workflow_id,
            workflow_on_error: self.workflow_on_error,
            parent_log_id: Some(parent_log_id),
            depth: self.depth + 1,
        }
    }
}

#[async_trait]
impl<'a> NestedStepExecutor for RunScope<'a> {
    async fn execute_steps(
        &self,
        steps: &[WorkflowStep],
        context: &mut ExecutionContext,
    ) -> Result<StepsRun, WorkflowError> {
        if self.depth > self.engine.config.max_depth {
            return Err(WorkflowError::nesting_too_deep(self.engine.config.max_depth));
        }

        Ok(self.engine.run_steps(self, steps, context).await)
    }
}

impl WorkflowEngine {
    /// Create an engine with the default configuration
    pub fn new(registry: Arc<HandlerRegistry>, log_store: Arc<dyn ExecutionLogStore>) -> Self {
        Self::with_config(registry, log_store, WorkflowEngineConfig::default())
    }

    /// Create with custom configuration
    pub fn with_config(
        registry: Arc<HandlerRegistry>,
        log_store: Arc<dyn ExecutionLogStore>,
        config: WorkflowEngineConfig,
    ) -> Self {
        Self {
            registry,
            log_store,
            config,
        }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn log_store(&self) -> Arc<dyn ExecutionLogStore> {
        Arc::clone(&self.log_store)
    }

    pub fn config(&self) -> &WorkflowEngineConfig {
        &self.config
    }

    /// Reject a workflow that cannot be run at all
    fn check_runnable(&self, workflow: &Workflow) -> Result<(), WorkflowError> {
        if !workflow.is_enabled() {
            return Err(WorkflowError::disabled(workflow.id().as_str()));
        }

        if self.config.strict_validation {
            self.registry.validate(workflow)?;
        }

        Ok(())
    }

    /// Run a snapshot of top-level steps and build the summary
    async fn run_workflow(
        &self,
        workflow: &Workflow,
        steps: Vec<WorkflowStep>,
        mut context: ExecutionContext,
    ) -> RunSummary {
        let start = Instant::now();
        context.seed_trigger();

        info!(
            workflow_id = %workflow.id(),
            steps = steps.len(),
            "Executing workflow"
        );

        let mut scope = RunScope::root(self, workflow.id());
        scope.workflow_on_error = workflow.on_error();

        let run = self.run_steps(&scope, &steps, &mut context).await;
        let execution_time_ms = start.elapsed().as_millis() as u64;
        let failed = run.outcomes.iter().filter(|o| o.is_failed()).count();

        info!(
            workflow_id = %workflow.id(),
            attempted = run.outcomes.len(),
            failed,
            aborted = run.aborted,
            execution_time_ms,
            "Workflow finished"
        );

        RunSummary {
            workflow_id: workflow.id().clone(),
            steps: run.outcomes,
            execution_time_ms,
            aborted: run.aborted,
            context: context.into_map(),
        }
    }

    /// Execute a list of steps in order
    ///
    /// Failures are recorded and the next sibling runs, unless the effective
    /// error policy of the failing step is `abort`.
    async fn run_steps(
        &self,
        scope: &RunScope<'_>,
        steps: &[WorkflowStep],
        context: &mut ExecutionContext,
    ) -> StepsRun {
        let mut run = StepsRun::default();

        for step in steps {
            let outcome = self.run_step(scope, step, context).await;
            let failed = outcome.is_failed();
            run.outcomes.push(outcome);

            if failed && self.effective_on_error(scope, step) == OnErrorAction::Abort {
                warn!(
                    workflow_id = %scope.workflow_id,
                    step_id = %step.id(),
                    remaining = steps.len() - run.outcomes.len(),
                    "Aborting step list after failure"
                );
                run.aborted = true;
                break;
            }
        }

        run
    }

    fn effective_on_error(&self, scope: &RunScope<'_>, step: &WorkflowStep) -> OnErrorAction {
        step.on_error()
            .or(scope.workflow_on_error)
            .unwrap_or(self.config.default_on_error)
    }

    /// Execute one step: open log, dispatch, merge, close log
    async fn run_step(
        &self,
        scope: &RunScope<'_>,
        step: &WorkflowStep,
        context: &mut ExecutionContext,
    ) -> StepOutcome {
        let key = handler_key(step);
        let log = ExecutionLog::started(
            scope.workflow_id.clone(),
            step.id().clone(),
            key.clone(),
            context.snapshot(),
        )
        .with_parent(scope.parent_log_id.clone());
        let log_id = log.id().clone();

        if let Err(e) = self.log_store.create(&log).await {
            warn!(log_id = %log_id, error = %e, "Failed to record execution log start");
        }

        debug!(
            workflow_id = %scope.workflow_id,
            step_id = %step.id(),
            handler = %key,
            depth = scope.depth,
            "Dispatching step"
        );

        let start = Instant::now();
        let child_scope = scope.child(log_id.clone());
        let result = match self.registry.resolve(step) {
            Ok(handler) => handler.handle(context, step, &child_scope).await,
            Err(e) => Err(e),
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(result) => {
                self.complete_success(step.id(), log_id, result, duration_ms, context)
                    .await
            }
            Err(err) => {
                let message = err.to_string();
                if err.is_handler_not_found() {
                    error!(step_id = %step.id(), error = %message, "No handler for step");
                } else {
                    warn!(step_id = %step.id(), error = %message, duration_ms, "Step failed");
                }

                self.close_log(&log_id, LogCompletion::failed(message.clone(), duration_ms))
                    .await;
                StepOutcome::failure(step.id().clone(), message, duration_ms, log_id.to_string())
            }
        }
    }

    async fn complete_success(
        &self,
        step_id: &StepId,
        log_id: ExecutionLogId,
        result: StepResult,
        duration_ms: u64,
        context: &mut ExecutionContext,
    ) -> StepOutcome {
        let StepResult {
            raw,
            parsed,
            context: partial,
            logs,
            token_usage,
            cost,
            skipped,
        } = result;

        for line in &logs {
            debug!(step_id = %step_id, "{}", line);
        }

        context.merge(partial);
        if !skipped && !parsed.is_null() {
            context.record_step_output(step_id, parsed.clone());
        }

        let completion =
            LogCompletion::success(raw, parsed, duration_ms).with_accounting(token_usage, cost);
        self.close_log(&log_id, completion).await;

        debug!(step_id = %step_id, duration_ms, skipped, "Step succeeded");
        StepOutcome::success(step_id.clone(), duration_ms, log_id.to_string()).with_skipped(skipped)
    }

    async fn close_log(&self, log_id: &ExecutionLogId, completion: LogCompletion) {
        if let Err(e) = self.log_store.update(log_id, completion).await {
            warn!(log_id = %log_id, error = %e, "Failed to record execution log completion");
        }
    }
}

#[async_trait]
impl WorkflowExecutor for WorkflowEngine {
    async fn execute(
        &self,
        workflow: &Workflow,
        context: ExecutionContext,
    ) -> Result<RunSummary, WorkflowError> {
        self.check_runnable(workflow)?;
        Ok(self
            .run_workflow(workflow, workflow.ordered_steps(), context)
            .await)
    }

    async fn execute_from(
        &self,
        workflow: &Workflow,
        context: ExecutionContext,
        start_step_id: &StepId,
    ) -> Result<RunSummary, WorkflowError> {
        self.check_runnable(workflow)?;

        let mut steps = workflow.ordered_steps();
        let position = steps
            .iter()
            .position(|s| s.id() == start_step_id)
            .ok_or_else(|| {
                WorkflowError::invalid_input(format!(
                    "Step '{}' is not a top-level step of workflow '{}'",
                    start_step_id,
                    workflow.id()
                ))
            })?;
        let steps = steps.split_off(position);

        Ok(self.run_workflow(workflow, steps, context).await)
    }

    async fn execute_steps(
        &self,
        workflow_id: &WorkflowId,
        steps: &[WorkflowStep],
        context: &mut ExecutionContext,
    ) -> Vec<StepOutcome> {
        let scope = RunScope::root(self, workflow_id);
        self.run_steps(&scope, steps, context).await.outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::execution_log::{ExecutionLogQuery, ExecutionStatus, MockExecutionLogStore};
    use crate::domain::workflow::{StepStatus, LOOP_KEY};
    use crate::domain::DomainError;
    use crate::infrastructure::execution_log::InMemoryExecutionLogStore;
    use crate::domain::workflow::StepHandler;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns its config `output` as parsed output and `context` as partial context
    struct EchoHandler;

    #[async_trait]
    impl StepHandler for EchoHandler {
        async fn handle(
            &self,
            _context: &mut ExecutionContext,
            step: &WorkflowStep,
            _executor: &dyn NestedStepExecutor,
        ) -> Result<StepResult, WorkflowError> {
            let output = step.config_value("output").cloned().unwrap_or(Value::Null);
            let partial = step.config_value("context").cloned().unwrap_or(json!({}));
            Ok(StepResult::completed(output)
                .with_context(partial)
                .with_token_usage(10)
                .with_cost(0.5))
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl StepHandler for FailingHandler {
        async fn handle(
            &self,
            _context: &mut ExecutionContext,
            step: &WorkflowStep,
            _executor: &dyn NestedStepExecutor,
        ) -> Result<StepResult, WorkflowError> {
            Err(WorkflowError::step_execution(step.id().as_str(), "always fails"))
        }
    }

    /// Runs its children once per call and counts invocations
    #[derive(Default)]
    struct NestingHandler {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl StepHandler for NestingHandler {
        async fn handle(
            &self,
            context: &mut ExecutionContext,
            step: &WorkflowStep,
            executor: &dyn NestedStepExecutor,
        ) -> Result<StepResult, WorkflowError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            let run = executor
                .execute_steps(&step.ordered_children(), context)
                .await?;
            Ok(StepResult::completed(json!({ "children": run.outcomes.len() })))
        }
    }

    /// Reads `loop.item` as its output, to observe context passed down
    struct LoopItemHandler;

    #[async_trait]
    impl StepHandler for LoopItemHandler {
        async fn handle(
            &self,
            context: &mut ExecutionContext,
            _step: &WorkflowStep,
            _executor: &dyn NestedStepExecutor,
        ) -> Result<StepResult, WorkflowError> {
            let item = context
                .get(LOOP_KEY)
                .and_then(|l| l.get("item"))
                .cloned()
                .unwrap_or(Value::Null);
            Ok(StepResult::completed(item))
        }
    }

    struct SkippingHandler;

    #[async_trait]
    impl StepHandler for SkippingHandler {
        async fn handle(
            &self,
            _context: &mut ExecutionContext,
            _step: &WorkflowStep,
            _executor: &dyn NestedStepExecutor,
        ) -> Result<StepResult, WorkflowError> {
            Ok(StepResult::skipped("nothing to do"))
        }
    }

    fn registry() -> Arc<HandlerRegistry> {
        Arc::new(
            HandlerRegistry::new()
                .with_handler("ECHO", Arc::new(EchoHandler))
                .with_handler("FAIL", Arc::new(FailingHandler))
                .with_handler("NEST", Arc::new(NestingHandler::default()))
                .with_handler("LOOP_ITEM", Arc::new(LoopItemHandler))
                .with_handler("SKIP", Arc::new(SkippingHandler)),
        )
    }

    fn engine_with(config: WorkflowEngineConfig) -> (WorkflowEngine, InMemoryExecutionLogStore) {
        let store = InMemoryExecutionLogStore::new();
        let engine = WorkflowEngine::with_config(registry(), Arc::new(store.clone()), config);
        (engine, store)
    }

    fn engine() -> (WorkflowEngine, InMemoryExecutionLogStore) {
        engine_with(WorkflowEngineConfig::default())
    }

    fn workflow(steps: Vec<WorkflowStep>) -> Workflow {
        Workflow::new(WorkflowId::new("test").unwrap(), "Test Workflow").with_steps(steps)
    }

    fn echo(id: &str, output: Value) -> WorkflowStep {
        WorkflowStep::new(id, "ECHO").with_config(json!({ "output": output }))
    }

    fn statuses(summary: &RunSummary) -> Vec<(String, StepStatus)> {
        summary
            .steps
            .iter()
            .map(|o| (o.step_id.to_string(), o.status))
            .collect()
    }

    #[tokio::test]
    async fn test_execute_records_outputs() {
        let (engine, _) = engine();
        let wf = workflow(vec![echo("1", json!({"text": "hi"})), echo("2", json!(7))]);

        let summary = engine
            .execute(&wf, ExecutionContext::from_value(json!({"lead": {"id": 3}})))
            .await
            .unwrap();

        assert!(summary.is_success());
        assert!(!summary.aborted);
        assert_eq!(summary.context["step_1"], json!({"text": "hi"}));
        assert_eq!(summary.context["trigger"], json!({"lead": {"id": 3}}));
        assert_eq!(
            summary.context["steps"],
            json!([
                {"step_id": "1", "output": {"text": "hi"}},
                {"step_id": "2", "output": 7}
            ])
        );
    }

    #[tokio::test]
    async fn test_steps_run_in_rank_order() {
        let (engine, _) = engine();
        let wf = workflow(vec![
            echo("late", json!("c")).with_order(3),
            echo("early", json!("a")).with_order(1),
            echo("middle", json!("b")).with_order(2),
        ]);

        let summary = engine.execute(&wf, ExecutionContext::new()).await.unwrap();
        let ids: Vec<_> = summary.steps.iter().map(|o| o.step_id.to_string()).collect();

        assert_eq!(ids, vec!["early", "middle", "late"]);
    }

    #[tokio::test]
    async fn test_result_context_merges_recursively() {
        let (engine, _) = engine();
        let wf = workflow(vec![WorkflowStep::new("1", "ECHO")
            .with_config(json!({ "context": {"a": {"y": 2}} }))]);

        let summary = engine
            .execute(&wf, ExecutionContext::from_value(json!({"a": {"x": 1}})))
            .await
            .unwrap();

        assert_eq!(summary.context["a"], json!({"x": 1, "y": 2}));
    }

    #[tokio::test]
    async fn test_failed_step_does_not_stop_run() {
        let (engine, store) = engine();
        let wf = workflow(vec![
            echo("1", json!(1)),
            WorkflowStep::new("2", "FAIL"),
            echo("3", json!(3)),
        ]);

        let summary = engine.execute(&wf, ExecutionContext::new()).await.unwrap();

        assert_eq!(
            statuses(&summary),
            vec![
                ("1".to_string(), StepStatus::Success),
                ("2".to_string(), StepStatus::Failed),
                ("3".to_string(), StepStatus::Success),
            ]
        );
        assert_eq!(
            summary.outcome("2").unwrap().error.as_deref(),
            Some("Step execution failed in '2': always fails")
        );

        let logs = store.all().await;
        assert_eq!(logs.len(), 3);
        assert_eq!(logs[1].status(), ExecutionStatus::Failed);
        assert_eq!(logs[0].status(), ExecutionStatus::Success);
        assert_eq!(logs[2].status(), ExecutionStatus::Success);
    }

    #[tokio::test]
    async fn test_every_invocation_has_one_terminal_log() {
        let (engine, store) = engine();
        let wf = workflow(vec![
            echo("1", json!(1)),
            WorkflowStep::new("2", "FAIL"),
            WorkflowStep::new("3", "NEST").with_children(vec![echo("4", json!(4))]),
        ]);

        let summary = engine.execute(&wf, ExecutionContext::new()).await.unwrap();
        let logs = store.all().await;

        assert_eq!(logs.len(), 4);
        for log in &logs {
            assert!(log.status().is_terminal());
            assert!(log.duration_ms().is_some());
            assert!(log.completed_at().is_some());
            let has_error = log.error_message().is_some();
            assert_eq!(has_error, log.status() == ExecutionStatus::Failed);
        }

        for outcome in &summary.steps {
            let id = ExecutionLogId::new(outcome.execution_log_id.clone()).unwrap();
            assert!(store.get(&id).await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn test_log_captures_accounting_and_snapshot() {
        let (engine, store) = engine();
        let wf = workflow(vec![echo("1", json!("out"))]);

        engine
            .execute(&wf, ExecutionContext::from_value(json!({"k": "v"})))
            .await
            .unwrap();

        let log = &store.all().await[0];
        assert_eq!(log.step_type(), "ECHO");
        assert_eq!(log.input_context()["k"], json!("v"));
        assert_eq!(log.parsed_output(), Some(&json!("out")));
        assert_eq!(log.token_usage(), Some(10));
        assert_eq!(log.cost(), Some(0.5));
    }

    #[tokio::test]
    async fn test_unknown_handler_is_step_failure() {
        let (engine, store) = engine();
        let wf = workflow(vec![
            WorkflowStep::new("1", "ACTION").with_config(json!({"action_type": "teleport"})),
            echo("2", json!(2)),
        ]);

        let summary = engine.execute(&wf, ExecutionContext::new()).await.unwrap();

        let failed = summary.outcome("1").unwrap();
        assert!(failed.is_failed());
        assert!(failed
            .error
            .as_deref()
            .unwrap()
            .contains("ACTION_TELEPORT"));
        assert!(summary.outcome("2").unwrap().is_success());

        let logs = store.all().await;
        assert_eq!(logs[0].step_type(), "ACTION_TELEPORT");
        assert_eq!(logs[0].status(), ExecutionStatus::Failed);
    }

    #[tokio::test]
    async fn test_abort_policy_stops_remaining_steps() {
        let (engine, store) = engine();
        let wf = workflow(vec![
            echo("1", json!(1)),
            WorkflowStep::new("2", "FAIL").with_on_error(OnErrorAction::Abort),
            echo("3", json!(3)),
        ]);

        let summary = engine.execute(&wf, ExecutionContext::new()).await.unwrap();

        assert!(summary.aborted);
        assert_eq!(summary.steps.len(), 2);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_workflow_abort_policy_with_step_override() {
        let (engine, _) = engine();
        let wf = workflow(vec![
            WorkflowStep::new("1", "FAIL").with_on_error(OnErrorAction::Continue),
            WorkflowStep::new("2", "FAIL"),
            echo("3", json!(3)),
        ])
        .with_on_error(OnErrorAction::Abort);

        let summary = engine.execute(&wf, ExecutionContext::new()).await.unwrap();

        assert!(summary.aborted);
        assert_eq!(summary.steps.len(), 2);
    }

    #[tokio::test]
    async fn test_engine_default_abort() {
        let (engine, _) = engine_with(WorkflowEngineConfig {
            default_on_error: OnErrorAction::Abort,
            ..Default::default()
        });
        let wf = workflow(vec![WorkflowStep::new("1", "FAIL"), echo("2", json!(2))]);

        let summary = engine.execute(&wf, ExecutionContext::new()).await.unwrap();
        assert_eq!(summary.steps.len(), 1);
    }

    #[tokio::test]
    async fn test_disabled_workflow_is_rejected() {
        let (engine, store) = engine();
        let wf = workflow(vec![echo("1", json!(1))]).with_enabled(false);

        let err = engine.execute(&wf, ExecutionContext::new()).await.unwrap_err();

        assert_eq!(err, WorkflowError::disabled("test"));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_strict_validation_rejects_unknown_types() {
        let (engine, store) = engine_with(WorkflowEngineConfig {
            strict_validation: true,
            ..Default::default()
        });
        let wf = workflow(vec![
            echo("1", json!(1)),
            WorkflowStep::new("2", "NEST").with_children(vec![WorkflowStep::new("3", "MYSTERY")]),
        ]);

        let err = engine.execute(&wf, ExecutionContext::new()).await.unwrap_err();

        assert_eq!(err, WorkflowError::UnknownStepTypes(vec!["MYSTERY".into()]));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_nested_logs_link_to_parent() {
        let (engine, store) = engine();
        let wf = workflow(vec![WorkflowStep::new("outer", "NEST").with_children(vec![
            echo("b", json!("b")).with_order(2),
            echo("a", json!("a")).with_order(1),
        ])]);

        let summary = engine.execute(&wf, ExecutionContext::new()).await.unwrap();
        assert_eq!(summary.steps.len(), 1);

        let parent_id = ExecutionLogId::new(summary.steps[0].execution_log_id.clone()).unwrap();
        let children = store
            .list(&ExecutionLogQuery::new().with_parent(parent_id))
            .await
            .unwrap();
        let ids: Vec<_> = children.iter().map(|l| l.step_id().to_string()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        // Nested outputs land in the shared context before the parent's own
        let steps = summary.context["steps"].as_array().unwrap();
        let order: Vec<_> = steps.iter().map(|e| e["step_id"].clone()).collect();
        assert_eq!(order, vec![json!("a"), json!("b"), json!("outer")]);
    }

    #[tokio::test]
    async fn test_loop_iterations_log_under_for_each() {
        use crate::infrastructure::workflow::handlers::{ConditionHandler, ForEachHandler};

        let registry = HandlerRegistry::new()
            .with_handler("CONDITION", Arc::new(ConditionHandler))
            .with_handler("FOR_EACH", Arc::new(ForEachHandler))
            .with_handler("LOOP_ITEM", Arc::new(LoopItemHandler))
            .with_handler("FAIL", Arc::new(FailingHandler))
            .with_handler("ECHO", Arc::new(EchoHandler));
        let store = InMemoryExecutionLogStore::new();
        let engine = WorkflowEngine::new(Arc::new(registry), Arc::new(store.clone()));

        let wf = workflow(vec![WorkflowStep::new("check", "CONDITION")
            .with_config(json!({ "field": "lead.active" }))
            .with_children(vec![
                WorkflowStep::new("each", "FOR_EACH")
                    .with_config(json!({ "sourceArray": "{{ lead.tags }}" }))
                    .with_children(vec![
                        WorkflowStep::new("item", "LOOP_ITEM").with_order(1),
                        WorkflowStep::new("fail", "FAIL").with_order(2),
                    ]),
                WorkflowStep::new("inactive", "ECHO")
                    .with_config(json!({ "when": false, "output": "no" })),
            ])]);
        let context = ExecutionContext::from_value(json!({
            "lead": {"active": true, "tags": ["a", "b", "c"]}
        }));

        let summary = engine.execute(&wf, context).await.unwrap();
        assert!(summary.steps[0].is_success());

        let logs = store.all().await;
        let by_step = |id: &str| -> Vec<_> {
            logs.iter().filter(|l| l.step_id().as_str() == id).collect()
        };

        let condition = by_step("check");
        let for_each = by_step("each");
        assert_eq!(condition.len(), 1);
        assert_eq!(for_each.len(), 1);
        assert_eq!(for_each[0].parent_execution_log_id(), Some(condition[0].id()));
        assert_eq!(
            for_each[0].parsed_output(),
            Some(&json!({"iterations": 3, "failed_steps": 3}))
        );

        let items = by_step("item");
        assert_eq!(items.len(), 3);
        assert!(items
            .iter()
            .all(|l| l.parent_execution_log_id() == Some(for_each[0].id())));
        let outputs: Vec<_> = items.iter().map(|l| l.parsed_output().cloned()).collect();
        assert_eq!(outputs, vec![Some(json!("a")), Some(json!("b")), Some(json!("c"))]);

        let failures = by_step("fail");
        assert_eq!(failures.len(), 3);
        assert!(failures.iter().all(|l| {
            l.status() == ExecutionStatus::Failed
                && l.parent_execution_log_id() == Some(for_each[0].id())
        }));

        assert!(by_step("inactive").is_empty());

        let children = store
            .list(&ExecutionLogQuery::new().with_parent(for_each[0].id().clone()))
            .await
            .unwrap();
        assert_eq!(children.len(), 6);
    }

    #[tokio::test]
    async fn test_nesting_depth_limit() {
        let (engine, store) = engine_with(WorkflowEngineConfig {
            max_depth: 1,
            ..Default::default()
        });
        let wf = workflow(vec![WorkflowStep::new("1", "NEST").with_children(vec![
            WorkflowStep::new("2", "NEST").with_children(vec![echo("3", json!(3))]),
        ])]);

        let summary = engine.execute(&wf, ExecutionContext::new()).await.unwrap();

        // Step 2 runs at depth 1 but may not open depth 2
        let logs = store.all().await;
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[1].step_id().as_str(), "2");
        assert_eq!(
            logs[1].error_message(),
            Some("Maximum nesting depth of 1 exceeded")
        );
        assert!(summary.steps[0].is_success());
    }

    #[tokio::test]
    async fn test_skipped_result_is_success_without_output() {
        let (engine, store) = engine();
        let wf = workflow(vec![WorkflowStep::new("1", "SKIP")]);

        let summary = engine.execute(&wf, ExecutionContext::new()).await.unwrap();

        assert!(summary.steps[0].is_success());
        assert!(summary.steps[0].skipped);
        assert!(!summary.context.contains_key("steps"));
        assert_eq!(store.all().await[0].status(), ExecutionStatus::Success);
    }

    #[tokio::test]
    async fn test_execute_from_step() {
        let (engine, _) = engine();
        let wf = workflow(vec![
            echo("1", json!(1)).with_order(1),
            echo("2", json!(2)).with_order(2),
            echo("3", json!(3)).with_order(3),
        ]);

        let summary = engine
            .execute_from(&wf, ExecutionContext::new(), &StepId::from("2"))
            .await
            .unwrap();
        let ids: Vec<_> = summary.steps.iter().map(|o| o.step_id.to_string()).collect();
        assert_eq!(ids, vec!["2", "3"]);

        let err = engine
            .execute_from(&wf, ExecutionContext::new(), &StepId::from("9"))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_execute_steps_uses_caller_context() {
        let (engine, _) = engine();
        let mut context = ExecutionContext::from_value(json!({"loop": {"item": "x"}}));

        let outcomes = engine
            .execute_steps(
                &WorkflowId::new("test").unwrap(),
                &[WorkflowStep::new("1", "LOOP_ITEM")],
                &mut context,
            )
            .await;

        assert_eq!(outcomes.len(), 1);
        assert_eq!(context.get("step_1"), Some(&json!("x")));
        // No trigger seeding outside a full run
        assert!(!context.contains_key("trigger"));
    }

    #[tokio::test]
    async fn test_log_store_failures_do_not_fail_steps() {
        let mut store = MockExecutionLogStore::new();
        store
            .expect_create()
            .returning(|_| Err(DomainError::storage("unavailable")));
        store
            .expect_update()
            .times(1)
            .returning(|_, _| Err(DomainError::storage("unavailable")));

        let engine = WorkflowEngine::new(registry(), Arc::new(store));
        let wf = workflow(vec![echo("1", json!(1))]);

        let summary = engine.execute(&wf, ExecutionContext::new()).await.unwrap();
        assert!(summary.is_success());
    }
}
