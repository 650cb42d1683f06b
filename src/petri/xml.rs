use super::{Arc, ArcKind, Net, Place, Transition, TransitionKind};
use anyhow::Result;
use std::borrow::Cow;
use std::io::Write;

//
// Public Interface
//

/// Project level settings of the model file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Project {
    /// Name of the net, by convention the path of the model file.
    pub name: String,
    /// Declaration files included by the model.
    pub includes: Vec<String>,
    /// Models composed with this one as slaves.
    pub inputs: Vec<String>,
}

#[rustfmt::skip]
pub fn write_net<W>(net: &Net, project: &Project, mut out: W) -> Result<()>
where
    W: Write,
{
    writeln!(out, "<?xml version=\"1.0\" encoding=\"UTF-8\" ?>")?;
    writeln!(out, "<romeo version=\"Romeo v3.8.4-rc1\"></romeo>")?;
    writeln!(out, "<TPN name=\"{}\">", escape(&project.name))?;

    for place in net.places.iter() {
        write_place(&mut out, place)?;
        for transition in place.transitions.iter() {
            write_transition(&mut out, place, transition)?;
        }
    }

    for arc in net.arcs.iter() {
        write_arc(&mut out, arc)?;
    }

    writeln!(out, "<timedCost>-1</timedCost>")?;
    writeln!(out, "<nbTokenColor>2</nbTokenColor>")?;
    writeln!(out, "<declaration><![CDATA[// insert here the state variables declarations")?;
    writeln!(out, "// and possibly some code to initialize them")?;
    writeln!(out, "// using C-like syntax\n")?;
    writeln!(out, "// insert here your type definitions using C-like syntax\n")?;
    writeln!(out, "// insert here your function definitions")?;
    writeln!(out, "// using C-like syntax]]>\n</declaration>\n")?;

    writeln!(out, "<project nbinput=\"{}\" openinput=\"0\" nbinclude=\"{}\">",
        project.inputs.len(), project.includes.len())?;
    for (id, file) in project.inputs.iter().enumerate() {
        writeln!(out, "    <input id=\"{}\" file=\"{}\" status=\"closed\"/>", id + 1, escape(file))?;
    }
    for (id, file) in project.includes.iter().enumerate() {
        writeln!(out, "    <include id=\"{}\" file=\"{}\"/>", id + 1, escape(file))?;
    }
    writeln!(out, "</project>\n")?;

    writeln!(out, "<preferences>")?;
    writeln!(out, "    <colorPlace c0=\"SkyBlue2\" c1=\"gray\" c2=\"cyan\" c3=\"green\" c4=\"yellow\" c5=\"brown\"/>")?;
    writeln!(out, "    <colorTransition c0=\"yellow\" c1=\"gray\" c2=\"cyan\" c3=\"green\" c4=\"SkyBlue2\" c5=\"brown\"/>")?;
    writeln!(out, "    <colorArc c0=\"black\" c1=\"gray\" c2=\"blue\" c3=\"#beb760\" c4=\"#be5c7e\" c5=\"#46be90\"/>")?;
    writeln!(out, "</preferences>")?;
    writeln!(out, "</TPN>")?;

    Ok(())
}

//
// Private Implementation
//

const COLUMN_WIDTH: f32 = 200.0;
const ROW_HEIGHT: f32 = 90.0;

fn column(depth: usize) -> f32 {
    depth as f32 * COLUMN_WIDTH + 151.0
}

#[rustfmt::skip]
fn write_place<W: Write>(out: &mut W, place: &Place) -> Result<()> {
    writeln!(out, "<place id=\"{}\" identifier=\"INST{:x}\" label=\"INST{:x}\" initialMarking=\"{}\" eft=\"0\" lft=\"0\">",
        place.id, place.address, place.address, place.initial_marking)?;
    writeln!(out, "    <graphics color=\"0\">")?;
    writeln!(out, "        <position x=\"{:.1}\" y=\"{:.1}\"/>",
        column(place.depth), ROW_HEIGHT * place.id as f32 + 61.0)?;
    writeln!(out, "        <deltaLabel deltax=\"50\" deltay=\"-5\"/>")?;
    writeln!(out, "    </graphics>")?;
    writeln!(out, "    <scheduling gamma=\"0\" omega=\"0\"/>")?;
    writeln!(out, "</place>")?;
    Ok(())
}

#[rustfmt::skip]
fn write_transition<W: Write>(out: &mut W, place: &Place, transition: &Transition) -> Result<()> {
    // taken edges are drawn up and to the left of their place
    let offset = match transition.kind {
        TransitionKind::Taken => -1.0,
        TransitionKind::Plain | TransitionKind::NotTaken => 0.0,
    };
    let suffix = transition.kind.suffix();

    writeln!(out, "<transition id=\"{}\" identifier=\"I{:x}{}\" label=\"I{:x}{}\" eft=\"0\" lft=\"0\" speed=\"1\" cost=\"0\" unctrl=\"0\" obs=\"1\" guard=\"{}\">",
        transition.id, transition.address, suffix, transition.address, suffix, escape(&transition.guard))?;
    writeln!(out, "    <graphics color=\"0\">")?;
    writeln!(out, "        <position x=\"{:.1}\" y=\"{:.1}\"/>",
        column(place.depth) + offset * 100.0, ROW_HEIGHT * place.id as f32 + 106.0 + offset * 45.0)?;
    writeln!(out, "        <deltaLabel deltax=\"25\" deltay=\"0\"/>")?;
    writeln!(out, "        <deltaGuard deltax=\"20\" deltay=\"-20\"/>")?;
    writeln!(out, "        <deltaUpdate deltax=\"130\" deltay=\"0\"/>")?;
    writeln!(out, "        <deltaSpeed deltax=\"-20\" deltay=\"5\"/>")?;
    writeln!(out, "        <deltaCost deltax=\"-20\" deltay=\"5\"/>")?;
    writeln!(out, "    </graphics>")?;
    writeln!(out, "    <update><![CDATA[{}]]></update>", transition.update)?;
    writeln!(out, "</transition>")?;
    Ok(())
}

#[rustfmt::skip]
fn write_arc<W: Write>(out: &mut W, arc: &Arc) -> Result<()> {
    let kind = match arc.kind {
        ArcKind::PlaceTransition => "PlaceTransition",
        ArcKind::TransitionPlace => "TransitionPlace",
    };

    writeln!(out, "    <arc place=\"{}\" transition=\"{}\" type=\"{}\" weight=\"1\" tokenColor=\"-1\" inhibitingCondition=\"\">",
        arc.place, arc.transition, kind)?;
    writeln!(out, "        <nail xnail=\"{:.1}\" ynail=\"{:.1}\"/>", arc.nail.0, arc.nail.1)?;
    writeln!(out, "        <graphics color=\"0\"></graphics>")?;
    writeln!(out, "    </arc>")?;
    Ok(())
}

/// Escape text for use inside a double quoted attribute.
fn escape(text: &str) -> Cow<str> {
    if !text.contains(|c: char| matches!(c, '&' | '<' | '>' | '"')) {
        return Cow::Borrowed(text);
    }

    let mut escaped = String::with_capacity(text.len() + 16);
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            c => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}
