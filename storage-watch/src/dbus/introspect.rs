// SPDX-License-Identifier: GPL-3.0-only

//! Child node listing from `org.freedesktop.DBus.Introspectable` XML.

use zbus_xml::Node;

/// Returns `parent/<name>` for every immediate child `<node>` in `xml`.
///
/// A document that does not parse is treated as having no children.
pub fn child_node_paths(parent: &str, xml: &str) -> Vec<String> {
    let node = match Node::from_reader(xml.as_bytes()) {
        Ok(node) => node,
        Err(e) => {
            tracing::warn!("Unparseable introspection data for {parent}: {e}");
            return Vec::new();
        }
    };

    let parent = parent.trim_end_matches('/');
    node.nodes()
        .iter()
        .filter_map(|child| child.name())
        .filter(|name| !name.is_empty())
        .map(|name| format!("{parent}/{name}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::child_node_paths;

    const DRIVES_XML: &str = r#"<!DOCTYPE node PUBLIC "-//freedesktop//DTD D-BUS Object Introspection 1.0//EN"
"http://www.freedesktop.org/standards/dbus/1.0/introspect.dtd">
<node>
  <interface name="org.freedesktop.DBus.Introspectable">
    <method name="Introspect">
      <arg type="s" name="xml_data" direction="out"/>
    </method>
  </interface>
  <node name="Samsung_SSD_870_EVO_1TB_S6PTNZ0R"/>
  <node name="Kingston_DataTraveler_3_0_E0D55E"/>
</node>
"#;

    #[test]
    fn lists_immediate_children() {
        let paths = child_node_paths("/org/freedesktop/UDisks2/drives", DRIVES_XML);

        assert_eq!(
            paths,
            vec![
                "/org/freedesktop/UDisks2/drives/Samsung_SSD_870_EVO_1TB_S6PTNZ0R",
                "/org/freedesktop/UDisks2/drives/Kingston_DataTraveler_3_0_E0D55E",
            ]
        );
    }

    #[test]
    fn node_without_children_is_empty() {
        let paths = child_node_paths("/org/freedesktop/UDisks2/drives", "<node></node>");
        assert!(paths.is_empty());
    }

    #[test]
    fn malformed_xml_is_empty() {
        let paths = child_node_paths(
            "/org/freedesktop/UDisks2/block_devices",
            "<node><node name=\"sda\"",
        );
        assert!(paths.is_empty());

        assert!(child_node_paths("/org/freedesktop/UDisks2/block_devices", "").is_empty());
    }
}
