//! Compiled, validated workflows.
//!
//! [`Workflow::compile`] turns a [`WorkflowDefinition`] into the form the
//! runtime executes: paths and expressions parsed, retry and catch rules
//! checked, and every state reference resolved. A `Workflow` value is always
//! valid; a malformed graph never reaches an execution.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path as FsPath;
use std::time::Duration;

use tracing::warn;

use crate::definition::{
    BranchDefinition, CatchDefinition, FailDefinition, InvokeDefinition, RetryDefinition,
    StateDefinition, TransformDefinition, WorkflowDefinition,
};
use crate::error::{EngineError, ErrorCategory, Result};
use crate::expression::Expression;
use crate::path::{Path, PathSegment};
use crate::resolver::ParamSpec;
use crate::retry::{CatchRule, ErrorMatcher, MATCH_ALL, RetryRule};

/// Default `result_path` for catch rules.
pub const DEFAULT_ERROR_PATH: &str = "error";

#[derive(Debug, Clone, PartialEq)]
pub struct InvokeState {
    pub unit: String,
    pub input_path: Option<Path>,
    pub parameters: Option<ParamSpec>,
    pub result_path: Path,
    pub timeout: Option<Duration>,
    pub retry: Vec<RetryRule>,
    pub catch: Vec<CatchRule>,
    pub next: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransformBody {
    Expression(Expression),
    Parameters(ParamSpec),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransformState {
    pub input_path: Option<Path>,
    pub body: TransformBody,
    pub result_path: Path,
    pub catch: Vec<CatchRule>,
    pub next: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Choice {
    pub condition: Expression,
    pub next: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BranchState {
    pub choices: Vec<Choice>,
    pub default: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FailState {
    pub error: ErrorCategory,
    pub cause: String,
}

/// One executable state.
#[derive(Debug, Clone, PartialEq)]
pub enum State {
    Invoke(InvokeState),
    Transform(TransformState),
    Branch(BranchState),
    Succeed,
    Fail(FailState),
}

/// Short, stable name of a state's kind, as written in workflow files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateKind {
    Invoke,
    Transform,
    Branch,
    Succeed,
    Fail,
}

impl State {
    pub fn kind(&self) -> StateKind {
        match self {
            State::Invoke(_) => StateKind::Invoke,
            State::Transform(_) => StateKind::Transform,
            State::Branch(_) => StateKind::Branch,
            State::Succeed => StateKind::Succeed,
            State::Fail(_) => StateKind::Fail,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, State::Succeed | State::Fail(_))
    }

    /// Every state this one can transition to, catch targets included.
    pub fn successors(&self) -> Vec<&str> {
        let mut out = Vec::new();
        match self {
            State::Invoke(s) => {
                out.push(s.next.as_str());
                out.extend(s.catch.iter().map(|c| c.next.as_str()));
            }
            State::Transform(s) => {
                out.push(s.next.as_str());
                out.extend(s.catch.iter().map(|c| c.next.as_str()));
            }
            State::Branch(s) => {
                out.extend(s.choices.iter().map(|c| c.next.as_str()));
                out.push(s.default.as_str());
            }
            State::Succeed | State::Fail(_) => {}
        }
        out
    }

    fn result_path(&self) -> Option<&Path> {
        match self {
            State::Invoke(s) => Some(&s.result_path),
            State::Transform(s) => Some(&s.result_path),
            _ => None,
        }
    }
}

/// A validated workflow graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Workflow {
    name: String,
    comment: Option<String>,
    start: String,
    order: Vec<String>,
    states: HashMap<String, State>,
    warnings: Vec<String>,
}

impl Workflow {
    /// Validate and compile a definition.
    pub fn compile(definition: &WorkflowDefinition) -> Result<Self> {
        if definition.states.is_empty() {
            return Err(invalid("workflow must declare at least one state"));
        }

        let mut order = Vec::with_capacity(definition.states.len());
        let mut states = HashMap::with_capacity(definition.states.len());
        for (name, state_def) in &definition.states {
            if name.is_empty() {
                return Err(invalid("state name cannot be empty"));
            }
            let state = compile_state(name, state_def)?;
            order.push(name.clone());
            if states.insert(name.clone(), state).is_some() {
                return Err(invalid(format!("duplicate state name '{name}'")));
            }
        }

        if definition.start.is_empty() {
            return Err(invalid("'start' must name a state"));
        }
        if !states.contains_key(&definition.start) {
            return Err(invalid(format!(
                "start state '{}' does not exist",
                definition.start
            )));
        }

        // Every reference must resolve.
        for name in &order {
            for target in states[name].successors() {
                if !states.contains_key(target) {
                    return Err(invalid(format!(
                        "state '{name}' references unknown state '{target}'"
                    )));
                }
            }
        }

        let mut workflow = Self {
            name: definition.name().to_string(),
            comment: definition.comment.clone(),
            start: definition.start.clone(),
            order,
            states,
            warnings: Vec::new(),
        };
        workflow.warnings = workflow.collect_warnings();
        for warning in &workflow.warnings {
            warn!(workflow = %workflow.name, "{warning}");
        }
        Ok(workflow)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Self::compile(&WorkflowDefinition::from_json(json)?)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Self::compile(&WorkflowDefinition::from_toml(toml_str)?)
    }

    pub fn from_file(path: &FsPath) -> Result<Self> {
        Self::compile(&WorkflowDefinition::from_file(path)?)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn start(&self) -> &str {
        &self.start
    }

    pub fn state(&self, name: &str) -> Option<&State> {
        self.states.get(name)
    }

    /// States in declaration order.
    pub fn states(&self) -> impl Iterator<Item = (&str, &State)> {
        self.order
            .iter()
            .filter_map(|name| self.states.get(name).map(|s| (name.as_str(), s)))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Non-fatal findings, such as root result paths.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Distinct unit names referenced by invoke states, in declaration order.
    pub fn unit_names(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.states()
            .filter_map(|(_, state)| match state {
                State::Invoke(invoke) => Some(invoke.unit.as_str()),
                _ => None,
            })
            .filter(|unit| seen.insert(*unit))
            .collect()
    }

    /// Names of the succeed and fail states, in declaration order.
    pub fn terminal_states(&self) -> Vec<&str> {
        self.states()
            .filter(|(_, state)| state.is_terminal())
            .map(|(name, _)| name)
            .collect()
    }

    /// Reject graphs containing any cycle, catch edges included.
    pub fn detect_cycles(&self) -> Result<()> {
        let index: HashMap<&str, usize> = self
            .order
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i))
            .collect();

        let n = self.order.len();
        let mut in_degree = vec![0usize; n];
        let mut adj: Vec<Vec<usize>> = vec![vec![]; n];

        for (from, name) in self.order.iter().enumerate() {
            for target in self.states[name].successors() {
                if let Some(&to) = index.get(target) {
                    adj[from].push(to);
                    in_degree[to] += 1;
                }
            }
        }

        let mut queue: Vec<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut visited = 0;

        while let Some(node) = queue.pop() {
            visited += 1;
            for &neighbor in &adj[node] {
                in_degree[neighbor] -= 1;
                if in_degree[neighbor] == 0 {
                    queue.push(neighbor);
                }
            }
        }

        if visited != n {
            let cyclic: Vec<&str> = (0..n)
                .filter(|&i| in_degree[i] > 0)
                .map(|i| self.order[i].as_str())
                .collect();
            return Err(invalid(format!(
                "cycle detected through states: {}",
                cyclic.join(", ")
            )));
        }
        Ok(())
    }

    fn collect_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        for (name, state) in self.states() {
            if state.result_path().is_some_and(Path::is_root) {
                warnings.push(format!(
                    "state '{name}' writes its result to the root '$'; every prior document field is discarded"
                ));
            }
        }

        let reachable = self.reachable();
        for (name, _) in self.states() {
            if !reachable.contains(name) {
                warnings.push(format!("state '{name}' is unreachable from '{}'", self.start));
            }
        }
        warnings
    }

    fn reachable(&self) -> HashSet<&str> {
        let mut seen = HashSet::from([self.start.as_str()]);
        let mut queue = VecDeque::from([self.start.as_str()]);
        while let Some(name) = queue.pop_front() {
            if let Some(state) = self.states.get(name) {
                for target in state.successors() {
                    if seen.insert(target) {
                        queue.push_back(target);
                    }
                }
            }
        }
        seen
    }
}

fn invalid(message: impl Into<String>) -> EngineError {
    EngineError::Validation(message.into())
}

fn compile_state(name: &str, definition: &StateDefinition) -> Result<State> {
    match definition {
        StateDefinition::Invoke(def) => compile_invoke(name, def).map(State::Invoke),
        StateDefinition::Transform(def) => compile_transform(name, def).map(State::Transform),
        StateDefinition::Branch(def) => compile_branch(name, def).map(State::Branch),
        StateDefinition::Succeed(_) => Ok(State::Succeed),
        StateDefinition::Fail(def) => compile_fail(name, def).map(State::Fail),
    }
}

fn compile_invoke(name: &str, def: &InvokeDefinition) -> Result<InvokeState> {
    if def.unit.is_empty() {
        return Err(invalid(format!("state '{name}': 'unit' cannot be empty")));
    }
    if def.timeout_secs == Some(0) {
        return Err(invalid(format!(
            "state '{name}': 'timeout_secs' must be greater than zero"
        )));
    }
    Ok(InvokeState {
        unit: def.unit.clone(),
        input_path: compile_optional_path(name, "input_path", def.input_path.as_deref())?,
        parameters: def
            .parameters
            .as_ref()
            .map(|raw| compile_parameters(name, raw))
            .transpose()?,
        result_path: compile_result_path(name, def.result_path.as_deref())?,
        timeout: def.timeout_secs.map(Duration::from_secs),
        retry: def
            .retry
            .iter()
            .enumerate()
            .map(|(i, rule)| compile_retry(name, i, rule))
            .collect::<Result<_>>()?,
        catch: compile_catches(name, &def.catch)?,
        next: def.next.clone(),
    })
}

fn compile_transform(name: &str, def: &TransformDefinition) -> Result<TransformState> {
    if !def.retry.is_empty() {
        return Err(invalid(format!(
            "state '{name}': transform states cannot declare retry rules"
        )));
    }
    let body = match (&def.expression, &def.parameters) {
        (Some(source), None) => TransformBody::Expression(Expression::parse(source).map_err(
            |e| invalid(format!("state '{name}': invalid expression '{source}': {e}")),
        )?),
        (None, Some(raw)) => TransformBody::Parameters(compile_parameters(name, raw)?),
        (Some(_), Some(_)) => {
            return Err(invalid(format!(
                "state '{name}': transform declares both 'expression' and 'parameters'"
            )));
        }
        (None, None) => {
            return Err(invalid(format!(
                "state '{name}': transform needs an 'expression' or 'parameters'"
            )));
        }
    };
    Ok(TransformState {
        input_path: compile_optional_path(name, "input_path", def.input_path.as_deref())?,
        body,
        result_path: compile_result_path(name, def.result_path.as_deref())?,
        catch: compile_catches(name, &def.catch)?,
        next: def.next.clone(),
    })
}

fn compile_branch(name: &str, def: &BranchDefinition) -> Result<BranchState> {
    if def.choices.is_empty() {
        return Err(invalid(format!(
            "state '{name}': branch must declare at least one choice"
        )));
    }
    let default = def.default.clone().ok_or_else(|| {
        invalid(format!("state '{name}': branch must declare a 'default'"))
    })?;
    let choices = def
        .choices
        .iter()
        .enumerate()
        .map(|(i, choice)| -> Result<Choice> {
            let condition = Expression::parse(&choice.condition).map_err(|e| {
                invalid(format!(
                    "state '{name}': choice {i} has invalid condition '{}': {e}",
                    choice.condition
                ))
            })?;
            Ok(Choice {
                condition,
                next: choice.next.clone(),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(BranchState { choices, default })
}

fn compile_fail(name: &str, def: &FailDefinition) -> Result<FailState> {
    if def.error.is_empty() {
        return Err(invalid(format!("state '{name}': 'error' cannot be empty")));
    }
    Ok(FailState {
        error: ErrorCategory::from(def.error.as_str()),
        cause: def.cause.clone(),
    })
}

fn compile_retry(name: &str, index: usize, def: &RetryDefinition) -> Result<RetryRule> {
    let context = format!("state '{name}': retry rule {index}");
    if def.errors.is_empty() {
        return Err(invalid(format!("{context} must list at least one error")));
    }
    let mut errors = Vec::with_capacity(def.errors.len());
    for error in &def.errors {
        if error == MATCH_ALL {
            return Err(invalid(format!(
                "{context}: '{MATCH_ALL}' is only allowed in catch rules"
            )));
        }
        let category = ErrorCategory::from(error.as_str());
        if !category.is_retryable() {
            return Err(invalid(format!(
                "{context}: '{category}' failures are not retryable"
            )));
        }
        errors.push(category);
    }
    if def.max_attempts == 0 {
        return Err(invalid(format!("{context}: 'max_attempts' must be at least 1")));
    }
    if !def.multiplier.is_finite() || def.multiplier < 1.0 {
        return Err(invalid(format!("{context}: 'multiplier' must be at least 1")));
    }
    Ok(RetryRule {
        errors,
        initial_delay: Duration::from_millis(def.initial_delay_ms),
        multiplier: def.multiplier,
        max_attempts: def.max_attempts,
        max_delay: def.max_delay_ms.map(Duration::from_millis),
    })
}

fn compile_catches(name: &str, defs: &[CatchDefinition]) -> Result<Vec<CatchRule>> {
    defs.iter()
        .enumerate()
        .map(|(index, def)| -> Result<CatchRule> {
            let context = format!("state '{name}': catch rule {index}");
            if def.errors.is_empty() {
                return Err(invalid(format!("{context} must list at least one error")));
            }
            let result_path = match def.result_path.as_deref() {
                Some(raw) => parse_path(name, "catch result_path", raw)?,
                None => Path::parse(DEFAULT_ERROR_PATH)
                    .map_err(|e| invalid(format!("{context}: {e}")))?,
            };
            if result_path.is_root() {
                return Err(invalid(format!(
                    "{context}: result_path cannot be the root, a catch must preserve the document"
                )));
            }
            Ok(CatchRule {
                errors: def.errors.iter().map(|e| ErrorMatcher::parse(e)).collect(),
                result_path,
                next: def.next.clone(),
            })
        })
        .collect()
}

fn compile_parameters(name: &str, raw: &serde_json::Value) -> Result<ParamSpec> {
    if !raw.is_object() {
        return Err(invalid(format!(
            "state '{name}': 'parameters' must be an object"
        )));
    }
    ParamSpec::compile(raw).map_err(|e| invalid(format!("state '{name}': {e}")))
}

fn compile_result_path(name: &str, raw: Option<&str>) -> Result<Path> {
    match raw {
        Some(raw) => parse_path(name, "result_path", raw),
        // Unset never means root.
        None => Ok(Path::root().child(PathSegment::Field(name.to_string()))),
    }
}

fn compile_optional_path(name: &str, field: &str, raw: Option<&str>) -> Result<Option<Path>> {
    raw.map(|raw| parse_path(name, field, raw)).transpose()
}

fn parse_path(name: &str, field: &str, raw: &str) -> Result<Path> {
    Path::parse(raw).map_err(|e| invalid(format!("state '{name}': invalid {field}: {e}")))
}
