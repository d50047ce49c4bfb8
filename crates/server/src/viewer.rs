//! The browser viewer: a canvas that replays display lists from
//! `/api/office/frames`, plus the character panel and mode toggles.

pub const VIEWER_HTML: &str = r###"<!doctype html>
<html lang="zh">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <meta name="theme-color" content="#1d2b53" />
  <title>Pixel Office</title>
  <style>
    :root{
      --bg-a:#0b0f1e;
      --bg-b:#1d2b53;
      --ice:#fff1e8;
      --teal:#29adff;
      --line:#83769c5a;
      --panel:#1d2b53cc;
      --panel-edge:#83769c88;
      --muted:#c2c3c7;
      --ok:#00e436;
      --warn:#ffec27;
      --bad:#ff004d;
      --dock-w:min(300px, 28vw);
      --screen-pad:12px;
    }
    *{box-sizing:border-box;margin:0;padding:0}
    html,body{width:100%;height:100%;overflow:hidden}
    body{
      font-family:"Courier New",ui-monospace,monospace;
      color:var(--ice);
      background:linear-gradient(165deg,var(--bg-b) 0%,var(--bg-a) 100%);
    }
    .layout{position:relative;width:100vw;height:100vh}
    .topbar{
      position:absolute;left:var(--screen-pad);right:var(--screen-pad);top:var(--screen-pad);
      height:54px;display:flex;gap:12px;align-items:center;justify-content:space-between;
      padding:10px 12px;border:2px solid var(--panel-edge);border-radius:6px;
      background:var(--bg-b);z-index:50;
    }
    .brand h1{font-size:15px;letter-spacing:1px}
    .brand .sub{font-size:11px;color:var(--muted)}
    .pill{display:flex;align-items:center;gap:8px;font-size:12px;color:var(--muted)}
    .dot{width:8px;height:8px;border-radius:2px;background:var(--warn)}
    .dot.ok{background:var(--ok)}
    .dot.bad{background:var(--bad)}
    .btn{
      border:2px solid var(--panel-edge);background:var(--bg-a);color:var(--ice);
      border-radius:4px;padding:6px 9px;font-family:inherit;font-weight:700;cursor:pointer;
    }
    .btn.on{border-color:var(--ok);color:var(--ok)}
    .btn:hover{border-color:var(--teal)}
    .viewport{
      position:absolute;left:var(--screen-pad);
      right:calc(var(--screen-pad) + var(--dock-w) + 12px);
      top:calc(var(--screen-pad) + 64px);bottom:var(--screen-pad);
      display:flex;align-items:center;justify-content:center;
      border:2px solid var(--panel-edge);border-radius:6px;background:#000;overflow:hidden;
    }
    canvas{image-rendering:pixelated;max-width:100%;max-height:100%;cursor:pointer}
    .dock{
      position:absolute;right:var(--screen-pad);top:calc(var(--screen-pad) + 64px);
      bottom:var(--screen-pad);width:var(--dock-w);padding:10px;
      border:2px solid var(--panel-edge);border-radius:6px;background:var(--panel);overflow:auto;
    }
    .dock h2{font-size:13px;margin-bottom:10px}
    .card{border:1px solid var(--line);border-radius:4px;padding:10px;margin-bottom:10px;background:#0b0f1eaa}
    .card .k{font-size:11px;color:var(--muted);margin-bottom:6px}
    .card .v{font-size:13px;white-space:pre-wrap;word-break:break-all}
    .bar{height:8px;background:#5f574f;border-radius:2px;margin:6px 0}
    .bar > i{display:block;height:100%;background:var(--ok);border-radius:2px}
    ul{list-style:none;font-size:12px;color:var(--muted)}
    li{margin:3px 0}
    @media (max-width: 980px){
      .dock{display:none}
      .viewport{right:var(--screen-pad)}
    }
  </style>
</head>
<body>
  <div class="layout">
    <header class="topbar">
      <div class="brand">
        <h1>PIXEL OFFICE</h1>
        <div class="sub" id="office.stats">-</div>
      </div>
      <div style="display:flex;align-items:center;gap:8px">
        <div class="pill" id="office.connection"><span id="connDot" class="dot"></span><span id="connText">connecting</span></div>
        <button id="liveBtn" class="btn" type="button">live</button>
        <button id="pushBtn" class="btn" type="button">push</button>
        <button id="runBtn" class="btn" type="button">pause</button>
        <button id="slowerBtn" class="btn" type="button" title="slower (-)">-</button>
        <span id="speedText" class="pill">1.0x</span>
        <button id="fasterBtn" class="btn" type="button" title="faster (+)">+</button>
        <button id="exportBtn" class="btn" type="button">save</button>
        <button id="importBtn" class="btn" type="button">load</button>
      </div>
    </header>

    <main class="viewport">
      <canvas id="office.canvas" width="800" height="600"></canvas>
    </main>

    <aside class="dock">
      <h2>Character</h2>
      <div id="office.panel" class="card"><div class="k">selection</div><div class="v">click someone in the office</div></div>
      <div class="card">
        <div class="k">yesterday</div>
        <div id="memoDate" class="k"></div>
        <div id="memoSummary" class="v">loading</div>
        <ul id="memoTasks"></ul>
      </div>
    </aside>
  </div>

  <script>
  (function(){
    const $ = (id) => document.getElementById(id);
    const canvas = $("office.canvas");
    const ctx = canvas.getContext("2d");
    const connDot = $("connDot");
    const connText = $("connText");
    const statsText = $("office.stats");
    const panel = $("office.panel");
    let view = null;

    function esc(s){
      return String(s).replace(/[&<>"]/g, (c) => ({ "&":"&amp;", "<":"&lt;", ">":"&gt;", "\"":"&quot;" }[c]));
    }

    function roundRect(x, y, w, h, r){
      ctx.beginPath();
      ctx.moveTo(x + r, y);
      ctx.arcTo(x + w, y, x + w, y + h, r);
      ctx.arcTo(x + w, y + h, x, y + h, r);
      ctx.arcTo(x, y + h, x, y, r);
      ctx.arcTo(x, y, x + w, y, r);
      ctx.closePath();
    }

    function replay(frame){
      for (const c of frame.commands){
        switch (c.op){
          case "clear":
            ctx.fillStyle = c.color; ctx.fillRect(0, 0, canvas.width, canvas.height); break;
          case "fill_rect":
            ctx.fillStyle = c.color; ctx.fillRect(c.x, c.y, c.w, c.h); break;
          case "stroke_rect":
            ctx.strokeStyle = c.color; ctx.lineWidth = c.line_width;
            ctx.setLineDash(c.dashed ? [5, 5] : []);
            ctx.strokeRect(c.x, c.y, c.w, c.h);
            ctx.setLineDash([]); break;
          case "line":
            ctx.strokeStyle = c.color; ctx.lineWidth = c.line_width;
            ctx.beginPath(); ctx.moveTo(c.x1, c.y1); ctx.lineTo(c.x2, c.y2); ctx.stroke(); break;
          case "ellipse":
            ctx.fillStyle = c.color;
            ctx.beginPath(); ctx.ellipse(c.x, c.y, c.rx, c.ry, 0, 0, Math.PI * 2); ctx.fill(); break;
          case "round_rect":
            roundRect(c.x, c.y, c.w, c.h, c.radius);
            ctx.fillStyle = c.fill; ctx.fill();
            if (c.stroke){ ctx.strokeStyle = c.stroke; ctx.lineWidth = 1; ctx.stroke(); }
            break;
          case "text":
            ctx.fillStyle = c.color; ctx.font = c.font; ctx.textAlign = c.align || "left";
            ctx.fillText(c.text, c.x, c.y); break;
        }
      }
    }

    function setConn(state, text){
      connDot.classList.toggle("ok", state === "ok");
      connDot.classList.toggle("bad", state === "bad");
      connText.textContent = text;
    }

    function renderView(v){
      view = v;
      const s = v.stats;
      statsText.textContent = `工作 ${s.working} | 待命 ${s.idle} | 平均进度 ${s.progress}% | 今日完成 ${v.completed_today}`;
      $("speedText").textContent = `${v.game_speed.toFixed(1)}x`;
      setConn(v.status_line.startsWith("live") ? "ok" : "warn", v.status_line);
      $("liveBtn").classList.toggle("on", v.live);
      $("pushBtn").classList.toggle("on", v.push);
      $("runBtn").textContent = v.running ? "pause" : "resume";
      const c = v.characters.find((x) => x.id === v.selected);
      if (!c){
        panel.innerHTML = `<div class="k">selection</div><div class="v">click someone in the office</div>`;
        return;
      }
      const hist = c.history.slice().reverse().map((h) =>
        `<li>${esc(h.time)} ${esc(h.task)}${h.completed ? " ✓" : ""}</li>`).join("");
      panel.innerHTML =
        `<div class="k">${esc(c.role)} · ${esc(c.zone_name)}</div>` +
        `<div class="v"><strong style="color:${esc(c.color)}">${esc(c.name)}</strong> (${esc(c.status)})</div>` +
        `<div class="v">${esc(c.task)}</div>` +
        `<div class="bar"><i style="width:${c.progress}%"></i></div>` +
        `<div class="k">${c.progress}%</div><ul>${hist}</ul>`;
    }

    async function post(path, body){
      const r = await fetch(path, {
        method: "POST",
        headers: { "content-type": "application/json" },
        body: JSON.stringify(body || {}),
      });
      if (!r.ok) throw new Error(`${path}: ${r.status}`);
      return r.json();
    }

    async function refreshView(){
      try{
        const r = await fetch("/api/office/characters", { cache: "no-store" });
        if (r.ok) renderView(await r.json());
      }catch(_e){
        setConn("bad", "offline");
      }
    }

    async function loadMemo(){
      try{
        const r = await fetch("/api/yesterday", { cache: "no-store" });
        const j = await r.json();
        $("memoDate").textContent = j.date || "";
        $("memoSummary").textContent = j.summary;
        $("memoTasks").innerHTML = (j.tasks || []).map((t) => `<li>${esc(t)}</li>`).join("");
      }catch(_e){
        $("memoSummary").textContent = "暂无记录";
      }
    }

    canvas.addEventListener("click", async (e) => {
      const r = canvas.getBoundingClientRect();
      const x = (e.clientX - r.left) * (canvas.width / r.width);
      const y = (e.clientY - r.top) * (canvas.height / r.height);
      try{ renderView(await post("/api/office/select", { x, y })); }catch(_e){}
    });

    $("liveBtn").addEventListener("click", async () => {
      renderView(await post("/api/office/live", { enabled: !(view && view.live) }));
    });
    $("pushBtn").addEventListener("click", async () => {
      renderView(await post("/api/office/push", { enabled: !(view && view.push) }));
    });
    $("runBtn").addEventListener("click", async () => {
      renderView(await post("/api/office/running", { running: !(view && view.running) }));
    });
    async function nudgeSpeed(delta){
      const current = view ? view.game_speed : 1;
      try{ renderView(await post("/api/office/speed", { speed: current + delta })); }catch(_e){}
    }
    $("slowerBtn").addEventListener("click", () => nudgeSpeed(-0.5));
    $("fasterBtn").addEventListener("click", () => nudgeSpeed(0.5));
    document.addEventListener("keydown", (e) => {
      if (e.key === "+" || e.key === "=") nudgeSpeed(0.5);
      if (e.key === "-" || e.key === "_") nudgeSpeed(-0.5);
    });
    $("exportBtn").addEventListener("click", async () => {
      try{ await post("/api/office/export"); }catch(_e){}
    });
    $("importBtn").addEventListener("click", async () => {
      try{ await post("/api/office/import"); }catch(_e){}
      refreshView();
    });

    const frames = new EventSource("/api/office/frames");
    frames.onmessage = (e) => replay(JSON.parse(e.data));
    frames.onerror = () => setConn("bad", "offline");

    refreshView();
    loadMemo();
    setInterval(refreshView, 1000);
  })();
  </script>
</body>
</html>
"###;
