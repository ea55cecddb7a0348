//! Test doubles for the executor and output seams.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use crate::error::{QupError, Result};
use crate::output::Output;
use crate::plan::{Phase, UpgradePlan};
use crate::qvm::command::Invocation;
use crate::qvm::executor::Executor;

type Scripted = std::result::Result<String, String>;

/// Scripted stand-in for the `qvm-*` tools that records every call.
#[derive(Default)]
pub struct FakeQvm {
    features: HashMap<(String, String), Scripted>,
    reads: HashMap<(String, String), Scripted>,
    fail_mutation: Option<usize>,
    unavailable: bool,
    mutations: Cell<usize>,
    calls: RefCell<Vec<Invocation>>,
}

impl FakeQvm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feature(mut self, vm: &str, key: &str, value: &str) -> Self {
        self.features
            .insert((vm.to_string(), key.to_string()), Ok(value.to_string()));
        self
    }

    /// Script the output of a read-only guest command, matched on its rendering.
    pub fn read(mut self, vm: &str, command: &str, output: &str) -> Self {
        self.reads
            .insert((vm.to_string(), command.to_string()), Ok(output.to_string()));
        self
    }

    pub fn fail_read(mut self, vm: &str, command: &str, stderr: &str) -> Self {
        self.reads
            .insert((vm.to_string(), command.to_string()), Err(stderr.to_string()));
        self
    }

    /// Make the n-th (1-based) mutating invocation exit non-zero.
    pub fn fail_mutation(mut self, n: usize) -> Self {
        self.fail_mutation = Some(n);
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.borrow().clone()
    }

    pub fn mutations(&self) -> Vec<Invocation> {
        self.calls
            .borrow()
            .iter()
            .filter(|inv| inv.is_mutating())
            .cloned()
            .collect()
    }

    fn reply(invocation: &Invocation, scripted: Option<&Scripted>) -> Result<String> {
        match scripted {
            Some(Ok(out)) => Ok(out.trim().to_string()),
            Some(Err(stderr)) => Err(QupError::execution(invocation.to_string(), stderr)),
            None => Ok(String::new()),
        }
    }
}

impl Executor for FakeQvm {
    fn ensure_available(&self) -> Result<()> {
        if self.unavailable {
            return Err(QupError::InterfaceUnavailable("qvm-ls".to_string()));
        }
        Ok(())
    }

    fn execute(&self, invocation: &Invocation) -> Result<String> {
        self.calls.borrow_mut().push(invocation.clone());

        match invocation {
            Invocation::FeatureGet { vm, key } => {
                Self::reply(invocation, self.features.get(&(vm.clone(), key.clone())))
            }
            Invocation::Run {
                vm,
                command,
                read_only: true,
                ..
            } => Self::reply(invocation, self.reads.get(&(vm.clone(), command.render()))),
            _ => {
                let n = self.mutations.get() + 1;
                self.mutations.set(n);
                if self.fail_mutation == Some(n) {
                    return Err(QupError::execution(
                        invocation.to_string(),
                        "simulated failure",
                    ));
                }
                Ok(String::new())
            }
        }
    }
}

/// Output sink that records events as plain strings.
#[derive(Default)]
pub struct RecordingOutput {
    events: RefCell<Vec<String>>,
}

impl RecordingOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.borrow().clone()
    }

    fn push(&self, event: String) {
        self.events.borrow_mut().push(event);
    }
}

impl Output for RecordingOutput {
    fn message(&self, text: &str) {
        self.push(format!("message: {}", text));
    }

    fn plan(&self, plan: &UpgradePlan) {
        self.push(format!(
            "plan: {} {} -> {} ({} phases)",
            plan.target_name,
            plan.step.current,
            plan.step.target,
            plan.phases.len()
        ));
    }

    fn phase_started(&self, index: usize, total: usize, phase: &Phase) {
        self.push(format!("start [{}/{}] {}", index + 1, total, phase.kind.name()));
    }

    fn phase_finished(&self, phase: &Phase) {
        self.push(format!("done {}", phase.kind.name()));
    }

    fn phase_failed(&self, phase: &Phase) {
        self.push(format!("failed {}", phase.kind.name()));
    }

    fn completed(&self, plan: &UpgradePlan) {
        self.push(format!("completed {}", plan.target_name));
    }
}
