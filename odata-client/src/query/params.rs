//! Ordered query parameter list

/// Ordered `name=value` pairs; inserting an existing name replaces its value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(Vec<(String, String)>);

impl Params {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|(n, _)| n == name)
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let index = self.0.iter().position(|(n, _)| n == name)?;
        Some(self.0.remove(index).1)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(n, _)| n.as_str())
    }

    /// Merge another list in, later values win
    pub fn extend<I, K, V>(&mut self, other: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (name, value) in other {
            self.insert(name, value);
        }
    }

    /// Copy without the given names
    pub fn without(&self, names: &[&str]) -> Params {
        Params(
            self.0
                .iter()
                .filter(|(n, _)| !names.contains(&n.as_str()))
                .cloned()
                .collect(),
        )
    }

    /// Split into (remaining, picked) by parameter name
    pub fn split(&self, names: &[String]) -> (Params, Params) {
        let (picked, rest): (Vec<_>, Vec<_>) =
            self.0.iter().cloned().partition(|(n, _)| names.contains(n));
        (Params(rest), Params(picked))
    }

    /// `name=value&...` with values percent-encoded
    pub fn to_query_string(&self) -> String {
        self.0
            .iter()
            .map(|(n, v)| format!("{}={}", n, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// `name=value&...` exactly as rendered
    pub fn to_raw_string(&self) -> String {
        self.0
            .iter()
            .map(|(n, v)| format!("{}={}", n, v))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Parse a query string, decoding names and values
    pub fn parse(query: &str) -> Params {
        let decode = |part: &str| {
            urlencoding::decode(part)
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| part.to_string())
        };
        let mut params = Params::new();
        let pairs = query.trim_start_matches('?').split('&');
        for pair in pairs.filter(|p| !p.is_empty()) {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            params.insert(decode(name), decode(value));
        }
        params
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut params = Params::new();
        params.extend(iter);
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_replaces_existing() {
        let mut params = Params::new();
        params.insert("$top", "5");
        params.insert("$skip", "10");
        params.insert("$top", "20");
        assert_eq!(params.len(), 2);
        assert_eq!(params.get("$top"), Some("20"));
        assert_eq!(params.names().collect::<Vec<_>>(), vec!["$top", "$skip"]);
    }

    #[test]
    fn test_split_and_query_string() {
        let params: Params = vec![("$filter", "Name eq 'a'"), ("$top", "2")]
            .into_iter()
            .collect();
        let (rest, picked) = params.split(&["$filter".to_string()]);
        assert_eq!(rest.to_raw_string(), "$top=2");
        assert_eq!(picked.to_query_string(), "$filter=Name%20eq%20%27a%27");
    }

    #[test]
    fn test_parse_decodes_values() {
        let params = Params::parse("?$skiptoken=abc%3D&$top=3");
        assert_eq!(params.get("$skiptoken"), Some("abc="));
        assert_eq!(params.get("$top"), Some("3"));
    }
}
