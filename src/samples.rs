//! Small stream-based pipelines used by the command-line demo and the scenario tests.

use crate::module::builder::{param, FunctionBuilder};
use crate::module::Module;
use crate::spirv::{
    asm::{Dim, ExecutionMode, ParameterModifiers, StorageClass},
    PatchKind, ScalarType, StreamsKind, Type,
};
use crate::symbol::SymbolTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sample {
    Compute,
    VertexPixel,
    Shared,
    Tessellation,
    Geometry,
}
impl Sample {
    pub const ALL: [Self; 5] = [
        Self::Compute,
        Self::VertexPixel,
        Self::Shared,
        Self::Tessellation,
        Self::Geometry,
    ];

    pub fn build(self) -> (Module, SymbolTable) {
        match self {
            Self::Compute => compute(),
            Self::VertexPixel => vertex_pixel(),
            Self::Shared => shared_subroutine(),
            Self::Tessellation => tessellation(),
            Self::Geometry => geometry(),
        }
    }
}

fn float4() -> Type {
    Type::float(32).of_vector(4)
}

fn texture2d() -> Type {
    Type::Image {
        sampled_type: ScalarType::Float(32),
        dim: Dim::Dim2,
        arrayed: false,
        multisampled: false,
    }
}

fn input_patch(size: u32) -> Type {
    Type::Patch {
        kind: PatchKind::Input,
        base: Box::new(Type::Streams(StreamsKind::Input)),
        size,
    }
}

fn output_patch(size: u32) -> Type {
    Type::Patch {
        kind: PatchKind::Output,
        base: Box::new(Type::Streams(StreamsKind::Input)),
        size,
    }
}

/// `CSMain` reading its dispatch id, next to a vertex shader that gets ignored.
pub fn compute() -> (Module, SymbolTable) {
    let mut m = Module::new();
    let mut table = SymbolTable::new();
    let uint3 = Type::uint(32).of_vector(3);

    let thread_id = m.declare_stream("ThreadId", uint3.clone(), Some("SV_DispatchThreadID"));
    let params = m.declare_cbuffer("ComputeParams", uint3.clone());
    let result = m.declare_private("LastThread", uint3.clone(), None);
    m.declare_resource("UnusedTexture", texture2d());

    let mut cs = FunctionBuilder::new(&mut m, "CSMain", Type::Void, vec![]);
    let id = cs.load(uint3.clone(), thread_id);
    let offset_ptr = cs.access_chain(uint3.clone(), StorageClass::Uniform, params, &[]);
    cs.load(uint3.clone(), offset_ptr);
    cs.store(result, id);
    let cs = cs.finish();
    m.add_execution_mode(cs, ExecutionMode::LocalSize, &[8, 8, 1]);
    table.declare_function("CSMain", cs);

    let vs = FunctionBuilder::new(&mut m, "VSMain", Type::Void, vec![]).finish();
    table.declare_function("VSMain", vs);

    (m, table)
}

/// Position transform in the vertex stage, one render target in the pixel stage.
pub fn vertex_pixel() -> (Module, SymbolTable) {
    let mut m = Module::new();
    let mut table = SymbolTable::new();
    let float2 = Type::float(32).of_vector(2);

    let position = m.declare_stream("Position", float4(), Some("POSITION"));
    let shading_position = m.declare_stream("ShadingPosition", float4(), Some("SV_Position"));
    let tex_coord = m.declare_stream("TexCoord", float2.clone(), Some("TEXCOORD0"));
    let is_front_face = m.declare_stream("IsFrontFace", Type::bool(), Some("SV_IsFrontFace"));
    let color_target = m.declare_stream("ColorTarget", float4(), Some("SV_Target0"));

    let mut init = FunctionBuilder::new(&mut m, "DefaultTint", float4(), vec![]);
    let one = init.constant(1.0f32);
    let white = init.composite_construct(float4(), vec![one; 4]);
    init.return_value(white);
    let init = init.finish();
    let tint = m.declare_initialized_stream("Tint", float4(), Some("TINT"), init);

    let per_draw = m.declare_cbuffer("PerDraw", float4());
    let texture = m.declare_resource("Texture0", texture2d());
    let sampler = m.declare_resource("Sampler0", Type::Sampler);
    m.set_resource_group(texture, 0, "PerMaterial");
    m.set_resource_group(sampler, 0, "PerMaterial");

    let mut vs = FunctionBuilder::new(&mut m, "VSMain", Type::Void, vec![]);
    let p = vs.load(float4(), position);
    let scale_ptr = vs.access_chain(float4(), StorageClass::Uniform, per_draw, &[]);
    let scale = vs.load(float4(), scale_ptr);
    let transformed = vs.fmul(float4(), p, scale);
    vs.store(shading_position, transformed);
    let vs = vs.finish();
    table.declare_function("VSMain", vs);

    let mut ps = FunctionBuilder::new(&mut m, "PSMain", Type::Void, vec![]);
    let frag = ps.load(float4(), shading_position);
    ps.load(float2, tex_coord);
    ps.load(Type::bool(), is_front_face);
    ps.load(Type::Sampler, sampler);
    let t = ps.load(float4(), tint);
    let color = ps.fmul(float4(), frag, t);
    ps.store(color_target, color);
    let ps = ps.finish();
    table.declare_function("PSMain", ps);

    (m, table)
}

/// A subroutine reading a stream from both the vertex and the pixel stage.
pub fn shared_subroutine() -> (Module, SymbolTable) {
    let mut m = Module::new();
    let mut table = SymbolTable::new();

    let position = m.declare_stream("Position", float4(), Some("POSITION"));
    let shading_position = m.declare_stream("ShadingPosition", float4(), Some("SV_Position"));
    let color = m.declare_stream("Color", float4(), Some("COLOR0"));
    let color_target = m.declare_stream("ColorTarget", float4(), Some("SV_Target0"));

    let mut shade = FunctionBuilder::new(&mut m, "Shade", float4(), vec![]);
    let c = shade.load(float4(), color);
    let squared = shade.fmul(float4(), c, c);
    shade.return_value(squared);
    let shade = shade.finish();

    let mut vs = FunctionBuilder::new(&mut m, "VSMain", Type::Void, vec![]);
    let p = vs.load(float4(), position);
    let s = vs.call(float4(), shade, vec![]);
    let moved = vs.fadd(float4(), p, s);
    vs.store(shading_position, moved);
    let vs = vs.finish();
    table.declare_function("VSMain", vs);

    let mut ps = FunctionBuilder::new(&mut m, "PSMain", Type::Void, vec![]);
    let s = ps.call(float4(), shade, vec![]);
    ps.store(color_target, s);
    let ps = ps.finish();
    table.declare_function("PSMain", ps);

    (m, table)
}

/// Vertex, hull (with a patch constant function), domain and pixel stages over triangles.
pub fn tessellation() -> (Module, SymbolTable) {
    let mut m = Module::new();
    let mut table = SymbolTable::new();
    let float3 = Type::float(32).of_vector(3);
    let tess_factor_type = Type::float(32).of_array(3);

    let position = m.declare_stream("Position", float4(), Some("POSITION"));
    let shading_position = m.declare_stream("ShadingPosition", float4(), Some("SV_Position"));
    let tess_factor =
        m.declare_patch_stream("TessFactor", tess_factor_type.clone(), Some("SV_TessFactor"));
    let inside_tess_factor =
        m.declare_patch_stream("InsideTessFactor", Type::float(32), Some("SV_InsideTessFactor"));
    let color_target = m.declare_stream("ColorTarget", float4(), Some("SV_Target0"));
    let displacement = m.declare_resource("DisplacementMap", texture2d());

    let mut vs = FunctionBuilder::new(&mut m, "VSMain", Type::Void, vec![]);
    let p = vs.load(float4(), position);
    vs.store(shading_position, p);
    let vs = vs.finish();
    table.declare_function("VSMain", vs);

    // void HSMain(InputPatch<Input, 3> input, out Output output, uint id : SV_OutputControlPointID)
    let mut hs = FunctionBuilder::new(
        &mut m,
        "HSMain",
        Type::Void,
        vec![
            param(input_patch(3), ParameterModifiers::None),
            param(Type::Streams(StreamsKind::Output), ParameterModifiers::Out),
            param(Type::uint(32), ParameterModifiers::None),
        ],
    );
    let (input, output, id_ptr) = (hs.parameter(0), hs.parameter(1), hs.parameter(2));
    let id = hs.load(Type::uint(32), id_ptr);
    let vertex = hs.access_chain_dynamic(
        Type::Streams(StreamsKind::Input),
        StorageClass::Function,
        input,
        vec![id],
    );
    let src = hs.stream_access(float4(), vertex, shading_position);
    let v = hs.load(float4(), src);
    let dst = hs.stream_access(float4(), output, shading_position);
    hs.store(dst, v);
    hs.load(texture2d(), displacement);
    let hs = hs.finish();
    m.set_parameter_semantic(hs, 2, "SV_OutputControlPointID");
    m.add_execution_mode(hs, ExecutionMode::OutputVertices, &[3]);
    m.set_patch_constant_function(hs, "HSConstants");
    table.declare_function("HSMain", hs);

    // void HSConstants(InputPatch<Input, 3> input, out Constants constants)
    let mut pc = FunctionBuilder::new(
        &mut m,
        "HSConstants",
        Type::Void,
        vec![
            param(input_patch(3), ParameterModifiers::None),
            param(Type::Streams(StreamsKind::Constants), ParameterModifiers::Out),
        ],
    );
    let constants = pc.parameter(1);
    let four = pc.constant(4.0f32);
    let edges = pc.composite_construct(tess_factor_type.clone(), vec![four; 3]);
    let edges_ptr = pc.stream_access(tess_factor_type.clone(), constants, tess_factor);
    pc.store(edges_ptr, edges);
    let inside_ptr = pc.stream_access(Type::float(32), constants, inside_tess_factor);
    pc.store(inside_ptr, four);
    let pc = pc.finish();
    table.declare_function("HSConstants", pc);

    // void DSMain(OutputPatch<Input, 3> patch, out Output output, Constants constants,
    //             float3 location : SV_DomainLocation)
    let mut ds = FunctionBuilder::new(
        &mut m,
        "DSMain",
        Type::Void,
        vec![
            param(output_patch(3), ParameterModifiers::None),
            param(Type::Streams(StreamsKind::Output), ParameterModifiers::Out),
            param(Type::Streams(StreamsKind::Constants), ParameterModifiers::In),
            param(float3.clone(), ParameterModifiers::None),
        ],
    );
    let (patch, output, constants, location_ptr) = (
        ds.parameter(0),
        ds.parameter(1),
        ds.parameter(2),
        ds.parameter(3),
    );
    let location = ds.load(float3, location_ptr);
    let mut sum = None;
    for i in 0..3 {
        let vertex = ds.access_chain(
            Type::Streams(StreamsKind::Input),
            StorageClass::Function,
            patch,
            &[i],
        );
        let ptr = ds.stream_access(float4(), vertex, shading_position);
        let v = ds.load(float4(), ptr);
        sum = Some(match sum {
            Some(acc) => ds.fadd(float4(), acc, v),
            None => v,
        });
    }
    let x = ds.composite_extract(Type::float(32), location, &[0]);
    let y = ds.composite_extract(Type::float(32), location, &[1]);
    let z = ds.composite_extract(Type::float(32), location, &[2]);
    let one = ds.constant(1.0f32);
    let weights = ds.composite_construct(float4(), vec![x, y, z, one]);
    let edges_ptr = ds.stream_access(tess_factor_type.clone(), constants, tess_factor);
    ds.load(tess_factor_type, edges_ptr);
    if let Some(sum) = sum {
        let weighted = ds.fmul(float4(), sum, weights);
        let dst = ds.stream_access(float4(), output, shading_position);
        ds.store(dst, weighted);
    }
    let ds = ds.finish();
    m.set_parameter_semantic(ds, 3, "SV_DomainLocation");
    m.add_execution_mode(ds, ExecutionMode::Triangles, &[]);
    m.add_execution_mode(ds, ExecutionMode::SpacingEqual, &[]);
    m.add_execution_mode(ds, ExecutionMode::VertexOrderCw, &[]);
    table.declare_function("DSMain", ds);

    let mut ps = FunctionBuilder::new(&mut m, "PSMain", Type::Void, vec![]);
    let frag = ps.load(float4(), shading_position);
    ps.store(color_target, frag);
    let ps = ps.finish();
    table.declare_function("PSMain", ps);

    (m, table)
}

/// A geometry shader re-emitting every triangle it receives.
pub fn geometry() -> (Module, SymbolTable) {
    let mut m = Module::new();
    let mut table = SymbolTable::new();

    let position = m.declare_stream("Position", float4(), Some("POSITION"));
    let shading_position = m.declare_stream("ShadingPosition", float4(), Some("SV_Position"));
    let color_target = m.declare_stream("ColorTarget", float4(), Some("SV_Target0"));

    let mut vs = FunctionBuilder::new(&mut m, "VSMain", Type::Void, vec![]);
    let p = vs.load(float4(), position);
    vs.store(shading_position, p);
    let vs = vs.finish();
    table.declare_function("VSMain", vs);

    // void GSMain(triangle Input input[3], inout TriangleStream<Output> stream)
    let mut gs = FunctionBuilder::new(
        &mut m,
        "GSMain",
        Type::Void,
        vec![
            param(
                Type::Streams(StreamsKind::Input).of_array(3),
                ParameterModifiers::Triangle,
            ),
            param(
                Type::OutputStream {
                    base: Box::new(Type::Streams(StreamsKind::Output)),
                },
                ParameterModifiers::InOut,
            ),
        ],
    );
    let (input, stream) = (gs.parameter(0), gs.parameter(1));
    for i in 0..3 {
        let vertex = gs.access_chain(
            Type::Streams(StreamsKind::Input),
            StorageClass::Function,
            input,
            &[i],
        );
        let ptr = gs.stream_access(float4(), vertex, shading_position);
        let v = gs.load(float4(), ptr);
        gs.store(shading_position, v);
        gs.emit_stream_vertex(stream);
    }
    gs.end_stream_primitive(stream);
    let gs = gs.finish();
    m.add_execution_mode(gs, ExecutionMode::OutputVertices, &[3]);
    m.add_execution_mode(gs, ExecutionMode::OutputTriangleStrip, &[]);
    table.declare_function("GSMain", gs);

    let mut ps = FunctionBuilder::new(&mut m, "PSMain", Type::Void, vec![]);
    let frag = ps.load(float4(), shading_position);
    ps.store(color_target, frag);
    let ps = ps.finish();
    table.declare_function("PSMain", ps);

    (m, table)
}
