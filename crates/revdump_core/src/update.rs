use crate::{CrawlState, Effect, Msg, NamespaceScope, Phase};

/// Pure update function: applies a message to state and returns any effects.
///
/// Messages that do not belong to the current phase are ignored, and the
/// terminal phases accept nothing.
pub fn update(mut state: CrawlState, msg: Msg) -> (CrawlState, Vec<Effect>) {
    if state.is_terminal() {
        return (state, Vec::new());
    }

    let effects = match msg {
        Msg::Start => {
            if *state.phase() != Phase::Idle {
                return (state, Vec::new());
            }
            match state.scope().clone() {
                NamespaceScope::All => {
                    state.set_phase(Phase::ResolvingNamespaces);
                    vec![Effect::ResolveNamespaces]
                }
                NamespaceScope::Explicit(namespaces) => enter_bulk(&mut state, namespaces),
            }
        }
        Msg::NamespacesResolved(namespaces) => {
            if *state.phase() != Phase::ResolvingNamespaces {
                return (state, Vec::new());
            }
            enter_bulk(&mut state, namespaces)
        }
        Msg::NamespaceExhausted => match state.phase().clone() {
            Phase::Bulk {
                namespaces,
                position,
            } => {
                let next = position + 1;
                match namespaces.get(next).copied() {
                    Some(namespace) => {
                        let mode = state.mode();
                        state.set_phase(Phase::Bulk {
                            namespaces,
                            position: next,
                        });
                        vec![Effect::ExportNamespace { namespace, mode }]
                    }
                    None => {
                        state.set_phase(Phase::Finished);
                        vec![Effect::Finish]
                    }
                }
            }
            _ => Vec::new(),
        },
        Msg::BulkUnsupported { reason } => {
            if !matches!(state.phase(), Phase::Bulk { .. }) {
                return (state, Vec::new());
            }
            // Bulk support depends on the server version, so the whole scope
            // restarts through titles, including namespaces already done.
            state.abandon_bulk();
            state.set_phase(Phase::PerTitle);
            vec![
                Effect::AnnounceFallback { reason },
                Effect::ExportTitles {
                    mode: state.mode(),
                    start: state.resume_title().map(ToOwned::to_owned),
                },
            ]
        }
        Msg::TitlesExhausted => {
            if *state.phase() != Phase::PerTitle {
                return (state, Vec::new());
            }
            state.set_phase(Phase::Finished);
            vec![Effect::Finish]
        }
        Msg::Fatal { reason } => {
            state.set_phase(Phase::Aborted {
                reason: reason.clone(),
            });
            vec![Effect::Abort { reason }]
        }
    };

    (state, effects)
}

fn enter_bulk(state: &mut CrawlState, namespaces: Vec<i64>) -> Vec<Effect> {
    match namespaces.first().copied() {
        Some(namespace) => {
            let mode = state.mode();
            state.set_phase(Phase::Bulk {
                namespaces,
                position: 0,
            });
            vec![Effect::ExportNamespace { namespace, mode }]
        }
        None => {
            state.set_phase(Phase::Finished);
            vec![Effect::Finish]
        }
    }
}
