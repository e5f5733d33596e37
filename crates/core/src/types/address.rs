//! Saved shipping addresses.
//!
//! At most one address in an [`AddressBook`] carries `is_default = true`.
//! Inserting a new default clears the flag on every other entry.

use serde::{Deserialize, Serialize};

use super::ParseError;
use super::id::AddressId;

/// Address label shown to the customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AddressKind {
    #[default]
    Home,
    Work,
    Other,
}

impl std::str::FromStr for AddressKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "home" => Ok(Self::Home),
            "work" => Ok(Self::Work),
            "other" => Ok(Self::Other),
            other => Err(ParseError::new("address type", other)),
        }
    }
}

/// Address fields as submitted by the customer, before the server assigns
/// an ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressInput {
    #[serde(rename = "type", default)]
    pub kind: AddressKind,
    pub full_name: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub pincode: String,
    pub phone: String,
    #[serde(default)]
    pub is_default: bool,
}

/// A saved address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub id: AddressId,
    #[serde(rename = "type", default)]
    pub kind: AddressKind,
    pub full_name: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub pincode: String,
    pub phone: String,
    #[serde(default)]
    pub is_default: bool,
}

impl Address {
    /// Attach a server-assigned ID to submitted fields.
    #[must_use]
    pub fn from_input(id: AddressId, input: AddressInput) -> Self {
        Self {
            id,
            kind: input.kind,
            full_name: input.full_name,
            address: input.address,
            city: input.city,
            state: input.state,
            pincode: input.pincode,
            phone: input.phone,
            is_default: input.is_default,
        }
    }

    /// Single-line rendering (e.g., for a terminal listing).
    #[must_use]
    pub fn one_line(&self) -> String {
        format!(
            "{}, {}, {}, {} {}",
            self.full_name, self.address, self.city, self.state, self.pincode
        )
    }
}

/// The customer's saved addresses.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct AddressBook {
    addresses: Vec<Address>,
}

impl AddressBook {
    /// Build a book from a server listing.
    ///
    /// If the listing flags more than one default, only the first keeps it.
    #[must_use]
    pub fn from_list(addresses: Vec<Address>) -> Self {
        let mut seen_default = false;
        let addresses = addresses
            .into_iter()
            .map(|mut address| {
                if address.is_default {
                    address.is_default = !seen_default;
                    seen_default = true;
                }
                address
            })
            .collect();
        Self { addresses }
    }

    #[must_use]
    pub fn addresses(&self) -> &[Address] {
        &self.addresses
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: &AddressId) -> Option<&Address> {
        self.addresses.iter().find(|a| &a.id == id)
    }

    #[must_use]
    pub fn contains(&self, id: &AddressId) -> bool {
        self.get(id).is_some()
    }

    /// The default address, or the first address if none is flagged.
    #[must_use]
    pub fn preferred(&self) -> Option<&Address> {
        self.addresses
            .iter()
            .find(|a| a.is_default)
            .or_else(|| self.addresses.first())
    }

    /// Insert a newly created address, keeping the single-default rule.
    pub fn insert(&mut self, address: Address) {
        if address.is_default {
            for existing in &mut self.addresses {
                existing.is_default = false;
            }
        }
        self.addresses.push(address);
    }

    /// Remove the address with `id`, returning it if it was present.
    pub fn remove(&mut self, id: &AddressId) -> Option<Address> {
        let index = self.addresses.iter().position(|a| &a.id == id)?;
        Some(self.addresses.remove(index))
    }

    /// Number of addresses flagged as default (0 or 1).
    #[must_use]
    pub fn default_count(&self) -> usize {
        self.addresses.iter().filter(|a| a.is_default).count()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn address(id: &str, is_default: bool) -> Address {
        Address {
            id: AddressId::new(id),
            kind: AddressKind::Home,
            full_name: "Asha Rao".to_string(),
            address: "12 MG Road".to_string(),
            city: "Bengaluru".to_string(),
            state: "KA".to_string(),
            pincode: "560001".to_string(),
            phone: "9800000000".to_string(),
            is_default,
        }
    }

    #[test]
    fn test_insert_default_clears_previous_default() {
        let mut book = AddressBook::from_list(vec![address("addr1", true), address("addr2", false)]);
        book.insert(address("addr3", true));

        assert!(!book.get(&AddressId::new("addr1")).unwrap().is_default);
        assert!(!book.get(&AddressId::new("addr2")).unwrap().is_default);
        assert!(book.get(&AddressId::new("addr3")).unwrap().is_default);
        assert_eq!(book.default_count(), 1);
    }

    #[test]
    fn test_insert_non_default_keeps_existing_default() {
        let mut book = AddressBook::from_list(vec![address("addr1", true)]);
        book.insert(address("addr2", false));
        assert_eq!(book.preferred().unwrap().id, AddressId::new("addr1"));
    }

    #[test]
    fn test_preferred_falls_back_to_first() {
        let book = AddressBook::from_list(vec![address("a", false), address("b", false)]);
        assert_eq!(book.preferred().unwrap().id, AddressId::new("a"));
        assert!(AddressBook::default().preferred().is_none());
    }

    #[test]
    fn test_from_list_keeps_only_first_default() {
        let book = AddressBook::from_list(vec![
            address("a", false),
            address("b", true),
            address("c", true),
        ]);
        assert_eq!(book.default_count(), 1);
        assert_eq!(book.preferred().unwrap().id, AddressId::new("b"));
    }

    #[test]
    fn test_address_wire_uses_type_field() {
        let json = serde_json::to_value(address("a", true)).unwrap();
        assert_eq!(json["type"], "home");
        assert_eq!(json["fullName"], "Asha Rao");
        assert_eq!(json["isDefault"], true);
    }
}
