//! Built-in memory stress scenario.
//!
//! Every page gets its own model: a compound action that repeatedly fills
//! the page with a randomly chosen data pattern and then checks it. Models
//! for different pages run in parallel, and fill/check steps are spread
//! across agents so a page written on one core is verified from another.

use purslane_dsl::{Action, ActionFactory, ActionHandle, Builder, DslError, LeafBody};
use rand::Rng;

pub const PAGE_SIZE: u64 = 4096 * 2;
pub const NUM_PATTERNS: u32 = 16;

const HEADERS: [&str; 3] = [
    "#include \"print.h\"",
    "#include \"xrt.h\"",
    "#include \"worker.h\"",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stimulus {
    pub addr: u64,
    pub pattern: u32,
    pub bus_shift: u32,
    pub inverse: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct StressConfig {
    pub pages: u32,
    pub rounds: u32,
    pub base: u64,
}

/// The default fill/check table. Device ports override entries by
/// registering a replacement under the same kind.
pub fn default_factory() -> ActionFactory<Stimulus> {
    ActionFactory::new()
        .with("fill", |s: &Stimulus| {
            let s = *s;
            Action::leaf("fill", move |_| {
                LeafBody::native(format!(
                    "fill((void*){:#x}, {}, {}, {}, {});",
                    s.addr, PAGE_SIZE, s.pattern, s.bus_shift, s.inverse as u32
                ))
            })
        })
        .with("check", |s: &Stimulus| {
            let s = *s;
            Action::leaf("check", move |_| {
                LeafBody::native(format!(
                    "check((void*){:#x}, {}, {}, {}, {});",
                    s.addr, PAGE_SIZE, s.pattern, s.bus_shift, s.inverse as u32
                ))
            })
        })
}

/// Declares the whole stress run.
pub fn scenario(
    b: &mut Builder,
    config: StressConfig,
    factory: &ActionFactory<Stimulus>,
) -> Result<ActionHandle, DslError> {
    b.parallel(|b| {
        for page in 0..config.pages {
            let addr = config.base + u64::from(page) * PAGE_SIZE;
            let mut model = Action::compound("model", move |b| {
                for _ in 0..config.rounds {
                    let stimulus = Stimulus {
                        addr,
                        pattern: b.rng().gen_range(0..NUM_PATTERNS),
                        bus_shift: b.rng().gen_range(0..4),
                        inverse: b.rng().gen_bool(0.5),
                    };
                    b.act(factory.make("fill", &stimulus)?)?;
                    b.act(factory.make("check", &stimulus)?)?;
                }
                Ok(())
            });
            for header in HEADERS {
                model = model.with_header(header);
            }
            b.act(model)?;
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use purslane_core::AssignPolicy;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn pages_are_independent_chains() {
        let config = StressConfig {
            pages: 3,
            rounds: 2,
            base: 0x8000_0000,
        };
        let mut b = Builder::new(4, 11);
        scenario(&mut b, config, &default_factory()).unwrap();
        let (mut graph, _) = b.finish();
        graph
            .finalize(AssignPolicy::Spread, &mut ChaCha8Rng::seed_from_u64(0))
            .unwrap();

        assert_eq!(graph.node_count(), 3 * 2 * 2);
        // Each model is one chain: fill, check, fill, check.
        assert_eq!(graph.edge_count(), 3 * 3);
        assert_eq!(graph.headers().count(), 3);
        let fills = graph
            .nodes_by_serial()
            .filter_map(|(_, n)| n.payload.as_ref().and_then(|p| p.native()))
            .filter(|src| src.starts_with("fill((void*)0x80004000"))
            .count();
        assert_eq!(fills, 2);
    }

    #[test]
    fn factory_override_changes_payload() {
        let factory = default_factory().with("check", |s| {
            let addr = s.addr;
            Action::native("check", format!("crc_check({addr:#x});"))
        });
        let config = StressConfig {
            pages: 1,
            rounds: 1,
            base: 0x1000,
        };
        let mut b = Builder::new(2, 0);
        scenario(&mut b, config, &factory).unwrap();
        let (graph, _) = b.finish();
        let checks: Vec<_> = graph
            .node_ids()
            .filter_map(|id| graph.node(id))
            .filter_map(|n| n.payload.as_ref().and_then(|p| p.native()))
            .filter(|src| src.starts_with("crc_check"))
            .collect();
        assert_eq!(checks, vec!["crc_check(0x1000);"]);
    }
}
