use crate::middleware::Middleware;

/// Step added to a colliding order until it becomes unique.
const ORDER_STEP: f64 = 0.1;
const ORDER_EPSILON: f64 = 1e-9;
/// Largest accepted order magnitude; beyond it [`ORDER_STEP`] stops moving a float.
pub const MAX_ORDER: f64 = 1e15;

pub struct MiddlewareEntry {
    pub name: String,
    pub middleware: Middleware,
    pub order: f64,
}

/// Application-wide middleware with a strict total order.
///
/// No two entries ever share an order: an explicit order that collides is
/// nudged upwards by [`ORDER_STEP`] until it is free, and an omitted order
/// appends after the current maximum. Orders that are not finite or exceed
/// [`MAX_ORDER`] in magnitude are treated as omitted.
#[derive(Default)]
pub struct MiddlewareTable {
    entries: Vec<MiddlewareEntry>,
}

impl MiddlewareTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a middleware and return the order it was given.
    pub fn add(&mut self, name: impl Into<String>, middleware: Middleware, order: Option<f64>) -> f64 {
        let name = name.into();
        let order = match order.filter(|requested| {
            let accepted = requested.is_finite() && requested.abs() <= MAX_ORDER;
            if !accepted {
                tracing::warn!("Middleware '{}' has unusable order {}; appending instead", name, requested);
            }
            accepted
        }) {
            Some(mut requested) => {
                while self.is_taken(requested) {
                    requested += ORDER_STEP;
                }
                requested
            }
            None => self.max_order().map_or(0.0, next_append),
        };

        tracing::debug!("Middleware '{}' registered at order {}", name, order);
        self.entries.push(MiddlewareEntry {
            name,
            middleware,
            order,
        });
        order
    }

    fn is_taken(&self, order: f64) -> bool {
        self.entries
            .iter()
            .any(|entry| (entry.order - order).abs() < ORDER_EPSILON)
    }

    fn max_order(&self) -> Option<f64> {
        self.entries.iter().map(|entry| entry.order).reduce(f64::max)
    }

    /// Entries sorted ascending by order, the sequence they are applied in.
    pub fn sorted(&self) -> Vec<&MiddlewareEntry> {
        let mut entries: Vec<_> = self.entries.iter().collect();
        entries.sort_by(|a, b| a.order.total_cmp(&b.order));
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// `max + 1`, or the next representable float once integers stop being exact.
fn next_append(max: f64) -> f64 {
    let next = max + 1.0;
    if next > max {
        return next;
    }
    let bits = max.to_bits();
    if max > 0.0 {
        f64::from_bits(bits + 1)
    } else {
        f64::from_bits(bits - 1)
    }
}
