//! Hook-chain engine
//!
//! Invokes an ordered sequence of callables, stopping at the first failure.

use anyhow::Result;

/// Call each link of the chain in order.
///
/// The first `Err` is returned unchanged and the remaining links are never
/// invoked. Links are thunks: callers close over the shared arguments, e.g.
/// `call_chain(layers.map(|l| move || l.on_init(program)))`.
pub fn call_chain<I, F>(chain: I) -> Result<()>
where
    I: IntoIterator<Item = F>,
    F: FnOnce() -> Result<()>,
{
    for link in chain {
        link()?;
    }
    Ok(())
}

/// Seam over [`call_chain`] used by the program context.
///
/// Every chain the context drives goes through exactly one `run` call, which
/// makes the number of chain invocations per phase observable.
pub trait ChainRunner {
    fn run<I, F>(&self, chain: I) -> Result<()>
    where
        I: IntoIterator<Item = F>,
        F: FnOnce() -> Result<()>;
}

/// Default runner: plain in-order invocation.
#[derive(Clone, Copy, Debug, Default)]
pub struct SerialChain;

impl ChainRunner for SerialChain {
    fn run<I, F>(&self, chain: I) -> Result<()>
    where
        I: IntoIterator<Item = F>,
        F: FnOnce() -> Result<()>,
    {
        call_chain(chain)
    }
}
