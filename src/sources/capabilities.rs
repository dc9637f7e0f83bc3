//! Capability document parsing
//!
//! Reads WMS 1.3.0, WFS 2.0.0 and WMTS (tile cache) capability documents
//! with quick-xml into a small element tree, then extracts layer metadata by
//! element local name. Namespace prefixes are ignored.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{SourceError, SourceErrorKind, SourceResult};
use crate::geo::{BoundingBox, Frame};
use crate::sources::{Capabilities, Protocol, SourceDescriptor, StyleInfo};

// =============================================================================
// Element Tree
// =============================================================================

#[derive(Debug, Clone, Default)]
pub(crate) struct Element {
    pub name: String,
    attributes: Vec<(String, String)>,
    text: String,
    pub children: Vec<Element>,
}

impl Element {
    pub fn parse(xml: &str) -> Result<Element, String> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(start)) => stack.push(Element::open(&start)?),
                Ok(Event::Empty(start)) => {
                    let element = Element::open(&start)?;
                    attach(&mut stack, &mut root, element);
                }
                Ok(Event::End(_)) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| "unbalanced closing tag".to_string())?;
                    attach(&mut stack, &mut root, element);
                }
                Ok(Event::Text(text)) => {
                    if let Some(top) = stack.last_mut() {
                        let text = text.unescape().map_err(|e| e.to_string())?;
                        top.text.push_str(&text);
                    }
                }
                Ok(Event::CData(data)) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    return Err(format!(
                        "XML error at byte {}: {}",
                        reader.buffer_position(),
                        e
                    ))
                }
            }
        }

        if !stack.is_empty() {
            return Err("document ended inside an open element".to_string());
        }
        root.ok_or_else(|| "empty document".to_string())
    }

    fn open(start: &BytesStart<'_>) -> Result<Element, String> {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| e.to_string())?;
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr.unescape_value().map_err(|e| e.to_string())?.into_owned();
            attributes.push((key, value));
        }
        Ok(Element {
            name,
            attributes,
            text: String::new(),
            children: Vec::new(),
        })
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn text(&self) -> Option<&str> {
        let text = self.text.trim();
        (!text.is_empty()).then_some(text)
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    pub fn child_text(&self, name: &str) -> Option<String> {
        self.child(name).and_then(Element::text).map(str::to_string)
    }

    /// Texts of all `name` children below `container`
    fn texts_in(&self, container: &str, name: &str) -> Vec<String> {
        self.child(container)
            .map(|c| {
                c.children_named(name)
                    .filter_map(Element::text)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// First descendant (depth-first, self excluded) with this name
    pub fn find(&self, name: &str) -> Option<&Element> {
        for child in &self.children {
            if child.name == name {
                return Some(child);
            }
            if let Some(found) = child.find(name) {
                return Some(found);
            }
        }
        None
    }
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => *root = Some(element),
    }
}

// =============================================================================
// Document parsing
// =============================================================================

fn parse_document(protocol: Protocol, xml: &str, expected_root: &[&str]) -> SourceResult<Element> {
    let root = Element::parse(xml).map_err(|e| SourceError::malformed(protocol, e))?;

    if root.name == "ServiceExceptionReport" || root.name == "ExceptionReport" {
        let message = root
            .find("ServiceException")
            .or_else(|| root.find("ExceptionText"))
            .and_then(Element::text)
            .unwrap_or("unspecified service exception")
            .to_string();
        return Err(SourceError::new(
            protocol,
            SourceErrorKind::ServiceException(message),
        ));
    }

    if !expected_root.contains(&root.name.as_str()) {
        return Err(SourceError::malformed(
            protocol,
            format!("unexpected root element <{}>", root.name),
        ));
    }
    Ok(root)
}

fn service_operations(root: &Element) -> Vec<String> {
    // WMS lists operations as elements under Capability/Request,
    // OWS services as ows:OperationsMetadata/Operation[@name].
    if let Some(request) = root.child("Capability").and_then(|c| c.child("Request")) {
        return request.children.iter().map(|c| c.name.clone()).collect();
    }
    root.child("OperationsMetadata")
        .map(|meta| {
            meta.children_named("Operation")
                .filter_map(|op| op.attr("name"))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_f64(text: Option<&str>) -> Option<f64> {
    text.and_then(|t| t.trim().parse().ok())
}

/// `ows:WGS84BoundingBox` with `LowerCorner`/`UpperCorner` as "lon lat"
fn ows_wgs84_bbox(element: &Element) -> Option<BoundingBox> {
    let bbox = element.child("WGS84BoundingBox")?;
    let lower = corner(bbox.child("LowerCorner")?.text()?)?;
    let upper = corner(bbox.child("UpperCorner")?.text()?)?;
    Some(BoundingBox::new(lower.0, lower.1, upper.0, upper.1, Frame::Geographic))
}

fn corner(text: &str) -> Option<(f64, f64)> {
    let mut parts = text.split_whitespace().map(str::parse::<f64>);
    match (parts.next(), parts.next()) {
        (Some(Ok(x)), Some(Ok(y))) => Some((x, y)),
        _ => None,
    }
}

// =============================================================================
// WMS 1.3.0
// =============================================================================

pub fn parse_wms(xml: &str) -> SourceResult<Capabilities> {
    let root = parse_document(Protocol::TiledRaster, xml, &["WMS_Capabilities", "WMT_MS_Capabilities"])?;

    let mut caps = Capabilities::new(Protocol::TiledRaster);
    caps.version = root.attr("version").map(str::to_string);
    if let Some(service) = root.child("Service") {
        caps.title = service.child_text("Title");
        caps.abstract_text = service.child_text("Abstract");
    }
    caps.operations = service_operations(&root);

    let capability = root.child("Capability");
    let map_formats: Vec<String> = capability
        .and_then(|c| c.child("Request"))
        .and_then(|r| r.child("GetMap"))
        .map(|get_map| {
            get_map
                .children_named("Format")
                .filter_map(Element::text)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    if let Some(top) = capability.and_then(|c| c.child("Layer")) {
        collect_wms_layers(top, &[], false, &map_formats, &mut caps.layers);
    }
    Ok(caps)
}

/// Walk nested `<Layer>` elements; CRS and queryable are inherited
fn collect_wms_layers(
    layer: &Element,
    inherited_crs: &[String],
    inherited_queryable: bool,
    map_formats: &[String],
    out: &mut Vec<SourceDescriptor>,
) {
    let mut crs: Vec<String> = inherited_crs.to_vec();
    for code in layer
        .children
        .iter()
        .filter(|c| c.name == "CRS" || c.name == "SRS")
        .filter_map(Element::text)
    {
        if !crs.iter().any(|c| c == code) {
            crs.push(code.to_string());
        }
    }

    let queryable = match layer.attr("queryable") {
        Some(v) => v == "1" || v.eq_ignore_ascii_case("true"),
        None => inherited_queryable,
    };

    if let Some(name) = layer.child_text("Name") {
        let mut descriptor = SourceDescriptor::new(Protocol::TiledRaster, name);
        descriptor.title = layer.child_text("Title");
        descriptor.abstract_text = layer.child_text("Abstract");
        descriptor.keywords = layer.texts_in("KeywordList", "Keyword");
        descriptor.crs = crs.clone();
        descriptor.queryable = queryable;
        descriptor.bbox = wms_bbox(layer);
        descriptor.styles = layer
            .children_named("Style")
            .filter_map(|style| {
                Some(StyleInfo {
                    name: style.child_text("Name")?,
                    title: style.child_text("Title"),
                    legend_url: style
                        .child("LegendURL")
                        .and_then(|l| l.child("OnlineResource"))
                        .and_then(|r| r.attr("href"))
                        .map(str::to_string),
                })
            })
            .collect();
        descriptor.output_formats = map_formats.to_vec();
        out.push(descriptor);
    }

    for child in layer.children_named("Layer") {
        collect_wms_layers(child, &crs, queryable, map_formats, out);
    }
}

fn wms_bbox(layer: &Element) -> Option<BoundingBox> {
    if let Some(geo) = layer.child("EX_GeographicBoundingBox") {
        let west = parse_f64(geo.child("westBoundLongitude").and_then(Element::text))?;
        let east = parse_f64(geo.child("eastBoundLongitude").and_then(Element::text))?;
        let south = parse_f64(geo.child("southBoundLatitude").and_then(Element::text))?;
        let north = parse_f64(geo.child("northBoundLatitude").and_then(Element::text))?;
        return Some(BoundingBox::new(west, south, east, north, Frame::Geographic));
    }

    // EPSG:4326 boxes in 1.3.0 are lat/lon ordered; only the unambiguous
    // frames are read here.
    layer.children_named("BoundingBox").find_map(|bbox| {
        let frame = match bbox.attr("CRS").or_else(|| bbox.attr("SRS"))? {
            "EPSG:3857" | "EPSG:900913" => Frame::Projected,
            "CRS:84" => Frame::Geographic,
            _ => return None,
        };
        Some(BoundingBox::new(
            parse_f64(bbox.attr("minx"))?,
            parse_f64(bbox.attr("miny"))?,
            parse_f64(bbox.attr("maxx"))?,
            parse_f64(bbox.attr("maxy"))?,
            frame,
        ))
    })
}

// =============================================================================
// WFS 2.0.0
// =============================================================================

pub fn parse_wfs(xml: &str) -> SourceResult<Capabilities> {
    let root = parse_document(Protocol::FeatureQuery, xml, &["WFS_Capabilities"])?;

    let mut caps = Capabilities::new(Protocol::FeatureQuery);
    caps.version = root.attr("version").map(str::to_string);
    if let Some(identification) = root.child("ServiceIdentification") {
        caps.title = identification.child_text("Title");
        caps.abstract_text = identification.child_text("Abstract");
    }
    caps.operations = service_operations(&root);

    if let Some(list) = root.child("FeatureTypeList") {
        for feature_type in list.children_named("FeatureType") {
            let Some(name) = feature_type.child_text("Name") else {
                continue;
            };
            let mut descriptor = SourceDescriptor::new(Protocol::FeatureQuery, name);
            descriptor.title = feature_type.child_text("Title");
            descriptor.abstract_text = feature_type.child_text("Abstract");
            descriptor.keywords = feature_type.texts_in("Keywords", "Keyword");

            let default_crs = feature_type
                .child_text("DefaultCRS")
                .or_else(|| feature_type.child_text("DefaultSRS"));
            descriptor.crs = default_crs
                .into_iter()
                .chain(
                    feature_type
                        .children
                        .iter()
                        .filter(|c| c.name == "OtherCRS" || c.name == "OtherSRS")
                        .filter_map(Element::text)
                        .map(str::to_string),
                )
                .map(|code| normalize_crs(&code))
                .collect();

            descriptor.output_formats = feature_type.texts_in("OutputFormats", "Format");
            descriptor.bbox = ows_wgs84_bbox(feature_type);
            descriptor.queryable = true;
            caps.layers.push(descriptor);
        }
    }
    Ok(caps)
}

/// `urn:ogc:def:crs:EPSG::4326` → `EPSG:4326`
fn normalize_crs(code: &str) -> String {
    match code.strip_prefix("urn:ogc:def:crs:EPSG::") {
        Some(number) => format!("EPSG:{}", number),
        None => code.to_string(),
    }
}

// =============================================================================
// WMTS (tile cache)
// =============================================================================

/// Vector tile format markers used by tile caches
const VECTOR_TILE_FORMATS: [&str; 3] = ["mapbox-vector", "vnd.mapbox-vector-tile", "protobuf"];

pub fn parse_wmts(xml: &str) -> SourceResult<Capabilities> {
    let root = parse_document(Protocol::TiledVector, xml, &["Capabilities"])?;

    let mut caps = Capabilities::new(Protocol::TiledVector);
    caps.version = root.attr("version").map(str::to_string);
    if let Some(identification) = root.child("ServiceIdentification") {
        caps.title = identification.child_text("Title");
        caps.abstract_text = identification.child_text("Abstract");
    }
    caps.operations = service_operations(&root);

    let Some(contents) = root.child("Contents") else {
        return Ok(caps);
    };

    for layer in contents.children_named("Layer") {
        let formats: Vec<String> = layer
            .children_named("Format")
            .filter_map(Element::text)
            .map(str::to_string)
            .collect();
        if !formats
            .iter()
            .any(|f| VECTOR_TILE_FORMATS.iter().any(|marker| f.contains(marker)))
        {
            continue;
        }
        let Some(name) = layer.child_text("Identifier") else {
            continue;
        };

        let mut descriptor = SourceDescriptor::new(Protocol::TiledVector, name);
        descriptor.title = layer.child_text("Title");
        descriptor.abstract_text = layer.child_text("Abstract");
        descriptor.bbox = ows_wgs84_bbox(layer);
        descriptor.output_formats = formats;
        descriptor.styles = layer
            .children_named("Style")
            .filter_map(|s| {
                Some(StyleInfo {
                    name: s.child_text("Identifier")?,
                    title: s.child_text("Title"),
                    legend_url: None,
                })
            })
            .collect();

        let mut zooms = Vec::new();
        for link in layer.children_named("TileMatrixSetLink") {
            if let Some(set) = link.child_text("TileMatrixSet") {
                descriptor.crs.push(set);
            }
            if let Some(limits) = link.child("TileMatrixSetLimits") {
                zooms.extend(
                    limits
                        .children_named("TileMatrixLimits")
                        .filter_map(|l| l.child_text("TileMatrix"))
                        .filter_map(|id| id.rsplit(':').next().and_then(|z| z.parse::<u8>().ok())),
                );
            }
        }
        descriptor.min_zoom = zooms.iter().min().copied();
        descriptor.max_zoom = zooms.iter().max().copied();
        caps.layers.push(descriptor);
    }
    Ok(caps)
}
