//! Some utility functions

use minidom::Element;

/// Walks an XML tree and returns every element that has the given name
pub fn find_elems<S: AsRef<str>>(root: &Element, searched_name: S) -> Vec<&Element> {
    let searched_name = searched_name.as_ref();
    let mut elems: Vec<&Element> = Vec::new();

    for el in root.children() {
        if el.name() == searched_name {
            elems.push(el);
        } else {
            let ret = find_elems(el, searched_name);
            elems.extend(ret);
        }
    }
    elems
}

/// Walks an XML tree until it finds an element with the given name
pub fn find_elem<S: AsRef<str>>(root: &Element, searched_name: S) -> Option<&Element> {
    let searched_name = searched_name.as_ref();
    if root.name() == searched_name {
        return Some(root);
    }

    for el in root.children() {
        if el.name() == searched_name {
            return Some(el);
        } else {
            let ret = find_elem(el, searched_name);
            if ret.is_some() {
                return ret;
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE_XML: &str = r#"<d:multistatus xmlns:d="DAV:">
        <d:response>
            <d:href>/calendars/personal/</d:href>
            <d:propstat>
                <d:prop><d:displayname>Personal</d:displayname></d:prop>
            </d:propstat>
        </d:response>
        <d:response>
            <d:href>/calendars/work/</d:href>
        </d:response>
    </d:multistatus>"#;

    #[test]
    fn test_find_elem_and_elems() {
        let root: Element = EXAMPLE_XML.parse().unwrap();

        let hrefs = find_elems(&root, "href");
        assert_eq!(hrefs.len(), 2);
        assert_eq!(hrefs[0].text(), "/calendars/personal/");

        let name = find_elem(&root, "displayname").unwrap();
        assert_eq!(name.text(), "Personal");

        assert!(find_elem(&root, "nonexistent").is_none());
    }
}
