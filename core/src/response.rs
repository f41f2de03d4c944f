//! Response classification and XML handling.
//!
//! # Design
//! `classify` is the single place where an `HttpResponse` becomes either
//! content or a typed `ApiError`. 404, 400 and 409 carry the service's
//! exception document, which is parsed into a `ServiceFault`; a fault with no
//! explanation gets `NO_EXPLANATION` rather than an error. Successful bodies
//! are parsed as XML and handed back as an `XmlDocument` that looks elements
//! up by local name under the service namespace.

use xmltree::{Element, XMLNode};

use crate::error::{ApiError, ServiceFault, NO_EXPLANATION};
use crate::http::HttpResponse;

/// XML namespace of the service's documents.
pub const VS_NAMESPACE: &str = "http://xml.vidispine.com/schema/vidispine";

/// A parsed XML response body.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlDocument {
    root: Element,
}

impl XmlDocument {
    pub fn parse(bytes: &[u8]) -> Result<Self, ApiError> {
        Element::parse(bytes)
            .map(|root| XmlDocument { root })
            .map_err(|e| ApiError::Xml(e.to_string()))
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    /// Local name of the root element.
    pub fn root_name(&self) -> &str {
        &self.root.name
    }

    /// First element matching a `/`-separated path of local names, each step
    /// a child in the service namespace. `find("timespan/field")` walks from
    /// the root.
    pub fn find(&self, path: &str) -> Option<&Element> {
        path.split('/')
            .filter(|step| !step.is_empty())
            .try_fold(&self.root, |el, step| child_elements(el).find(|c| is_vs(c, step)))
    }

    /// Every element matching the final step of `path`, under the first
    /// match of the preceding steps.
    pub fn find_all(&self, path: &str) -> Vec<&Element> {
        let (parent, last) = match path.rsplit_once('/') {
            Some((parent, last)) => (self.find(parent), last),
            None => (Some(&self.root), path),
        };
        parent
            .map(|p| child_elements(p).filter(|c| is_vs(c, last)).collect())
            .unwrap_or_default()
    }

    /// Text content of the element at `path`.
    pub fn find_text(&self, path: &str) -> Option<String> {
        self.find(path)
            .and_then(|el| el.get_text())
            .map(|t| t.into_owned())
    }
}

fn is_vs(el: &Element, name: &str) -> bool {
    el.name == name && el.namespace.as_deref() == Some(VS_NAMESPACE)
}

fn child_elements(el: &Element) -> impl Iterator<Item = &Element> {
    el.children.iter().filter_map(|node| match node {
        XMLNode::Element(e) => Some(e),
        _ => None,
    })
}

fn child_text(el: &Element, name: &str) -> Option<String> {
    child_elements(el)
        .find(|c| c.name == name)
        .and_then(|c| c.get_text())
        .map(|t| t.trim().to_string())
}

/// The service's fault report.
///
/// ```xml
/// <ExceptionDocument xmlns="http://xml.vidispine.com/schema/vidispine">
///   <notFound><type>Item</type><id>VX-1</id></notFound>
/// </ExceptionDocument>
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionDocument {
    pub kind: String,
    pub id: Option<String>,
    pub entity_type: Option<String>,
    pub context: Option<String>,
    pub explanation: Option<String>,
}

impl ExceptionDocument {
    /// Parse the first child of the document root as the fault element.
    /// Any root other than `ExceptionDocument` is rejected.
    pub fn parse(bytes: &[u8]) -> Result<Self, ApiError> {
        let root = Element::parse(bytes).map_err(|e| ApiError::Xml(e.to_string()))?;
        if root.name != "ExceptionDocument" {
            return Err(ApiError::Xml(format!(
                "expected <ExceptionDocument>, found <{}>",
                root.name
            )));
        }
        let fault = child_elements(&root).next().ok_or_else(|| {
            ApiError::Xml(format!("exception document <{}> has no fault element", root.name))
        })?;
        Ok(ExceptionDocument {
            kind: fault.name.clone(),
            id: child_text(fault, "id"),
            entity_type: child_text(fault, "type"),
            context: child_text(fault, "context"),
            explanation: child_text(fault, "explanation"),
        })
    }

    pub fn into_fault(self) -> ServiceFault {
        ServiceFault {
            kind: self.kind,
            id: self.id.unwrap_or_default(),
            entity_type: self.entity_type,
            context: self.context,
            explanation: self
                .explanation
                .unwrap_or_else(|| NO_EXPLANATION.to_string()),
        }
    }
}

impl ServiceFault {
    /// Fault details from a response body. A body that is not an exception
    /// document yields kind `unknown` with the body text as explanation.
    pub fn from_body(body: &[u8]) -> ServiceFault {
        match ExceptionDocument::parse(body) {
            Ok(doc) => doc.into_fault(),
            Err(_) => {
                let text = String::from_utf8_lossy(body).trim().to_string();
                ServiceFault {
                    kind: "unknown".to_string(),
                    id: String::new(),
                    entity_type: None,
                    context: None,
                    explanation: if text.is_empty() {
                        NO_EXPLANATION.to_string()
                    } else {
                        text
                    },
                }
            }
        }
    }
}

/// Pass a 2xx response through, or turn anything else into its error.
pub fn check(response: HttpResponse) -> Result<HttpResponse, ApiError> {
    if response.is_success() {
        return Ok(response);
    }
    match response.status {
        404 => Err(ApiError::NotFound(ServiceFault::from_body(&response.body))),
        400 => Err(ApiError::BadRequest(ServiceFault::from_body(&response.body))),
        409 => Err(ApiError::Conflict(ServiceFault::from_body(&response.body))),
        status => Err(ApiError::Http {
            status,
            reason: response.reason,
            body: response.body,
        }),
    }
}

/// Parse a 2xx body as XML. An empty body yields `None`.
pub fn classify(response: HttpResponse) -> Result<Option<XmlDocument>, ApiError> {
    let response = check(response)?;
    if response.body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    XmlDocument::parse(&response.body).map(Some)
}
