/// Hard per-intention step bound.
#[derive(Debug, Clone)]
pub struct LoopController {
    max_steps: u32,
    steps: u32,
}

impl LoopController {
    pub fn new(max_steps: u32) -> Self {
        Self { max_steps, steps: 0 }
    }

    pub fn limit(&self) -> u32 {
        self.max_steps
    }

    pub fn steps(&self) -> u32 {
        self.steps
    }

    /// Claim the next step. Returns `false` once the budget is spent.
    pub fn try_step(&mut self) -> bool {
        if self.steps >= self.max_steps {
            return false;
        }
        self.steps += 1;
        true
    }
}
