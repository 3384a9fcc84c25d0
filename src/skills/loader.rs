use crate::executor::dispatcher::ToolRegistry;
use crate::knowledge::PlanMemory;

/// Register every previously approved tool from plan memory. Entries that no
/// longer validate (e.g. a name now taken) are skipped with a warning.
pub fn load_persisted(memory: &PlanMemory, registry: &ToolRegistry) -> usize {
    let mut loaded = 0;
    for tool in memory.synthesized_tools() {
        let name = tool.spec.name.clone();
        match registry.register_synthesized(tool) {
            Ok(()) => loaded += 1,
            Err(e) => tracing::warn!(tool = %name, error = %e, "skipping stored tool"),
        }
    }
    if loaded > 0 {
        tracing::info!(count = loaded, "synthesized tools restored");
    }
    loaded
}
