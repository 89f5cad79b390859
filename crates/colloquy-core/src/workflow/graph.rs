//! DOT export of a dialog's state machine, for external rendering.

use crate::dialog::Dialog;
use crate::workflow::engine::TransitionPlan;

/// Render the dialog's transition plan as a DOT digraph. The current
/// state is highlighted; step states are labeled with their step names.
pub fn to_dot(dialog: &Dialog) -> String {
    let plan = TransitionPlan::for_template(&dialog.template);
    let enabled = dialog.template.enabled_steps();

    let mut out = String::from("digraph workflow {\n  rankdir=LR;\n  node [shape=box];\n");

    for (i, state) in plan.states.iter().enumerate() {
        let label = if *state == "start" || *state == "end" {
            state.clone()
        } else {
            // step_i states carry the step name for readability.
            enabled
                .get(i.saturating_sub(1))
                .map_or_else(|| state.clone(), |s| format!("{state}\\n{}", s.name()))
        };
        let attrs = if *state == dialog.current_state {
            format!("label=\"{label}\", style=filled, fillcolor=lightblue")
        } else {
            format!("label=\"{label}\"")
        };
        out.push_str(&format!("  \"{state}\" [{attrs}];\n"));
    }

    for transition in &plan.transitions {
        out.push_str(&format!(
            "  \"{}\" -> \"{}\" [label=\"{}\"];\n",
            transition.source, transition.dest, transition.trigger
        ));
    }

    out.push_str("}\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::DialogTemplate;

    #[test]
    fn dot_contains_states_transitions_and_highlight() {
        let template: DialogTemplate = serde_yaml::from_str(
            "name: t\nmodel: m\nsteps:\n  - name: greet\n    type: message\n    role: user\n    content: hi\n",
        )
        .expect("template");
        let mut dialog = Dialog::from_template(&template, None, None, None);
        dialog.current_state = "step_0".to_string();

        let dot = to_dot(&dialog);
        assert!(dot.contains("digraph workflow"));
        assert!(dot.contains("\"start\" -> \"step_0\" [label=\"run_step_0\"]"));
        assert!(dot.contains("\"step_0\" -> \"end\" [label=\"finalize\"]"));
        assert!(dot.contains("fillcolor=lightblue"));
        assert!(dot.contains("greet"));
    }
}
