use nickel_types::Nickel;

/// Nickels grouped by destination address, in insertion order.
#[derive(Clone, Debug, Default)]
pub struct NickelBatch {
    groups: Vec<(String, Vec<Nickel>)>,
}

impl NickelBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `nickel` for `address`. Addresses keep the order they were first
    /// seen in.
    pub fn add(&mut self, address: impl Into<String>, nickel: Nickel) -> &mut Self {
        let address = address.into();
        match self.groups.iter_mut().find(|(a, _)| *a == address) {
            Some((_, nickels)) => nickels.push(nickel),
            None => self.groups.push((address, vec![nickel])),
        }
        self
    }

    pub fn with(mut self, address: impl Into<String>, nickel: Nickel) -> Self {
        self.add(address, nickel);
        self
    }

    /// Total number of Nickels across all addresses.
    pub fn len(&self) -> usize {
        self.groups.iter().map(|(_, n)| n.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn addresses(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|(a, _)| a.as_str())
    }

    pub fn get(&self, address: &str) -> Option<&[Nickel]> {
        self.groups
            .iter()
            .find(|(a, _)| a == address)
            .map(|(_, n)| n.as_slice())
    }

    /// Every `(address, nickel)` pair, grouped by address.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Nickel)> {
        self.groups
            .iter()
            .flat_map(|(a, nickels)| nickels.iter().map(move |n| (a.as_str(), n)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_in_insertion_order() {
        let first = Nickel::create();
        let second = Nickel::create();
        let third = Nickel::create();

        let batch = NickelBatch::new()
            .with("tasks", first.clone())
            .with("documents", second.clone())
            .with("tasks", third.clone());

        assert_eq!(batch.len(), 3);
        assert_eq!(batch.addresses().collect::<Vec<_>>(), vec!["tasks", "documents"]);
        assert_eq!(batch.get("tasks").unwrap().len(), 2);

        let order: Vec<_> = batch
            .iter()
            .map(|(a, n)| (a, n.correlation_id()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("tasks", first.correlation_id()),
                ("tasks", third.correlation_id()),
                ("documents", second.correlation_id()),
            ]
        );
    }

    #[test]
    fn empty_batch() {
        let batch = NickelBatch::new();
        assert!(batch.is_empty());
        assert_eq!(batch.len(), 0);
        assert!(batch.get("anything").is_none());
    }
}
