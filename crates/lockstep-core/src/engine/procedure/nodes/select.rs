use super::super::runner::Runner;
use super::super::{NodeId, SelectNode};
use crate::engine::context::ExecutionContext;
use crate::engine::error::EngineError;

/// Collects the candidate sites and runs the for-each branch once per site.
pub(super) fn execute(
    runner: &mut Runner<'_>,
    id: NodeId,
    select: &SelectNode,
    ctx: &mut ExecutionContext<'_>,
) -> Result<(), EngineError> {
    let excluded_sites = select
        .exclude_same_site
        .iter()
        .map(|&other| runner.current_site(other))
        .collect::<Result<Vec<_>, _>>()?;
    let excluded_molecule_sites = select
        .exclude_same_molecule
        .iter()
        .map(|&other| runner.current_site(other))
        .collect::<Result<Vec<_>, _>>()?;
    let required_molecule_site = select
        .same_molecule_as
        .map(|other| runner.current_site(other))
        .transpose()?;

    let sites: Vec<usize> = {
        let configuration = ctx.configuration()?;
        let molecule_of = |index: usize| configuration.atom(index).map(|atom| atom.molecule_id);
        let excluded_molecules: Vec<_> = excluded_molecule_sites
            .iter()
            .filter_map(|&site| molecule_of(site))
            .collect();
        let required_molecule = required_molecule_site.and_then(molecule_of);

        match configuration.type_index(&select.atom_type) {
            // An atom type absent from the configuration simply yields no sites.
            None => Vec::new(),
            Some(type_index) => configuration
                .atoms_of_type(type_index)
                .filter(|atom| !excluded_sites.contains(&atom.index()))
                .filter(|atom| !excluded_molecules.contains(&atom.molecule_id))
                .filter(|atom| required_molecule.is_none_or(|m| atom.molecule_id == m))
                .map(|atom| atom.index())
                .collect(),
        }
    };

    let branch = runner.node(id)?.branch();
    runner.select_state_mut(id)?.n_selections += 1;

    let mut result = Ok(());
    for site in sites {
        {
            let state = runner.select_state_mut(id)?;
            state.current = Some(site);
            state.n_cumulative_sites += 1;
        }
        if let Some(branch) = branch {
            result = runner.execute(branch, ctx);
            if result.is_err() {
                break;
            }
        }
    }
    runner.select_state_mut(id)?.current = None;
    result
}
