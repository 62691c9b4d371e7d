use pyo3::prelude::*;

/// Python extension: placement search bindings.
///
/// module-name = "placer_mcts._core"; the search API lives in the `mcts`
/// submodule, re-exported by the pure Python package.
#[pymodule]
fn _core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    let mcts_module = PyModule::new(m.py(), "mcts")?;
    placer_mcts::bindings::register_mcts_module(&mcts_module)?;
    m.add_submodule(&mcts_module)?;

    Ok(())
}
