//! Change notifications polled by UI and history code.

use crate::layer::LayerId;

/// A structural or attribute change made through [`crate::LayerStack`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StackEvent {
    LayerAdded { id: LayerId, index: usize },
    LayerRemoved { id: LayerId, index: usize },
    LayerMoved { id: LayerId, from: usize, to: usize },
    LayersMerged { removed: LayerId, into: LayerId },
    AttributesChanged { id: LayerId },
    ContentChanged { id: LayerId },
    ActiveChanged { index: usize },
}
